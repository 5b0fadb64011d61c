use crate::{
    compute_commitment, select_committee, ConsensusError, ParamsRegistry, Result, RevealedVote,
    RoundOutcome, RoundSettlement, RoundStatus, TallyReport, ValidationRound, ValidatorSettlement,
    Verdict, Vote,
};
use agora_economics::{LedgerError, StakeLedger};
use agora_types::{Address, Amount, BasisPoints, Clock, Hash, JobId, Role};
use agora_vrf::RandomnessBeacon;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// What the orchestrator needs to open a round for a job
#[derive(Debug, Clone)]
pub struct RoundRequest {
    pub job_id: JobId,
    /// Receives the harmed-party share of validator slashes
    pub employer: Address,
    /// Never drawn onto this committee (parties to the job, blacklisted addresses)
    pub excluded: BTreeSet<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealReceipt {
    /// First accepted reveal of the round
    pub first_reveal: bool,
    pub all_revealed: bool,
}

/// Runs commit-reveal rounds over a registered validator pool. Validator stake
/// is locked for the life of a round and only the engine releases or slashes it.
pub struct ValidationEngine {
    params: Arc<ParamsRegistry>,
    stakes: Arc<StakeLedger>,
    beacon: Arc<dyn RandomnessBeacon>,
    clock: Arc<dyn Clock>,

    validators: Arc<RwLock<BTreeSet<Address>>>,
    rounds: Arc<RwLock<HashMap<JobId, Arc<Mutex<ValidationRound>>>>>,

    // Metrics
    pub rounds_opened_total: Option<Arc<prometheus::IntCounter>>,
    pub votes_committed_total: Option<Arc<prometheus::IntCounter>>,
    pub votes_revealed_total: Option<Arc<prometheus::IntCounter>>,
    pub quorum_failures_total: Option<Arc<prometheus::IntCounter>>,
}

impl ValidationEngine {
    pub fn new(
        params: Arc<ParamsRegistry>,
        stakes: Arc<StakeLedger>,
        beacon: Arc<dyn RandomnessBeacon>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            params,
            stakes,
            beacon,
            clock,
            validators: Arc::new(RwLock::new(BTreeSet::new())),
            rounds: Arc::new(RwLock::new(HashMap::new())),
            rounds_opened_total: None,
            votes_committed_total: None,
            votes_revealed_total: None,
            quorum_failures_total: None,
        }
    }

    /// Set metrics for round tracking
    pub fn set_metrics(
        &mut self,
        rounds_opened_total: Arc<prometheus::IntCounter>,
        votes_committed_total: Arc<prometheus::IntCounter>,
        votes_revealed_total: Arc<prometheus::IntCounter>,
        quorum_failures_total: Arc<prometheus::IntCounter>,
    ) {
        self.rounds_opened_total = Some(rounds_opened_total);
        self.votes_committed_total = Some(votes_committed_total);
        self.votes_revealed_total = Some(votes_revealed_total);
        self.quorum_failures_total = Some(quorum_failures_total);
    }

    pub fn params(&self) -> &Arc<ParamsRegistry> {
        &self.params
    }

    /// Join the validator pool. Requires the validator role's minimum stake to
    /// be available at registration time.
    pub async fn register_validator(&self, validator: Address) -> Result<()> {
        let required = self.stakes.role_params(Role::Validator).min_stake;
        let available = self.stakes.available(validator, Role::Validator).await;
        if available < required || available.is_zero() {
            return Err(LedgerError::InsufficientStake {
                available,
                required,
            }
            .into());
        }

        let mut validators = self.validators.write().await;
        let inserted = validators.insert(validator);
        info!(
            validator = %validator.short(),
            stake = available.as_u64(),
            pool_size = validators.len(),
            newly_registered = inserted,
            "🛡️ Validator registered"
        );
        Ok(())
    }

    pub async fn deregister_validator(&self, validator: Address) -> Result<()> {
        let mut validators = self.validators.write().await;
        if !validators.remove(&validator) {
            return Err(ConsensusError::ValidatorNotRegistered(validator));
        }
        info!(
            validator = %validator.short(),
            pool_size = validators.len(),
            "👋 Validator deregistered"
        );
        Ok(())
    }

    pub async fn registered_validators(&self) -> Vec<Address> {
        self.validators.read().await.iter().copied().collect()
    }

    pub async fn get_round(&self, job_id: JobId) -> Option<ValidationRound> {
        let round = self.rounds.read().await.get(&job_id).cloned()?;
        let round = round.lock().await;
        Some(round.clone())
    }

    async fn round_handle(&self, job_id: JobId) -> Result<Arc<Mutex<ValidationRound>>> {
        self.rounds
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(ConsensusError::RoundNotFound(job_id))
    }

    /// Draw a committee from the pool, lock each member's stake and start the
    /// commit phase. Nothing is locked if any step fails.
    pub async fn open_round(&self, request: RoundRequest) -> Result<ValidationRound> {
        let job_id = request.job_id;
        let now = self.clock.now();
        if self.rounds.read().await.contains_key(&job_id) {
            return Err(ConsensusError::RoundExists(job_id));
        }

        let (params_version, params) = self.params.current().await;
        let role = *self.stakes.role_params(Role::Validator);
        let stake = role.min_stake;
        let seed: Hash = self.beacon.seed_for(job_id.value()).await?;

        let registered: Vec<Address> = self.validators.read().await.iter().copied().collect();
        let mut candidates = Vec::with_capacity(registered.len());
        for validator in registered {
            if request.excluded.contains(&validator) {
                continue;
            }
            let available = self.stakes.available(validator, Role::Validator).await;
            if available >= stake {
                candidates.push(validator);
            }
        }
        if candidates.len() < params.min_committee_size {
            return Err(ConsensusError::InsufficientValidators {
                needed: params.min_committee_size,
                available: candidates.len(),
            });
        }

        let committee = select_committee(&seed, job_id, &candidates, params.max_committee_size);

        let mut rounds = self.rounds.write().await;
        if rounds.contains_key(&job_id) {
            return Err(ConsensusError::RoundExists(job_id));
        }
        if !stake.is_zero() {
            let locks: Vec<(Address, Role, Amount)> = committee
                .iter()
                .map(|v| (*v, Role::Validator, stake))
                .collect();
            self.stakes.lock_batch(&locks).await?;
        }

        let round = ValidationRound {
            job_id,
            employer: request.employer,
            params_version,
            commit_deadline: now.saturating_add(params.commit_window_secs),
            reveal_deadline: now
                .saturating_add(params.commit_window_secs)
                .saturating_add(params.reveal_window_secs),
            params,
            committee,
            stake_per_validator: stake,
            slash_bps: role.slash_bps,
            non_reveal_penalty_bps: role.non_reveal_penalty_bps,
            seed,
            opened_at: now,
            commitments: BTreeMap::new(),
            reveals: BTreeMap::new(),
            approvals: 0,
            rejections: 0,
            status: RoundStatus::Open,
            outcome: RoundOutcome::Pending,
            tallied_at: None,
        };
        rounds.insert(job_id, Arc::new(Mutex::new(round.clone())));

        if let Some(ref counter) = self.rounds_opened_total {
            counter.inc();
        }

        info!(
            job_id = %job_id,
            params_version,
            committee_size = round.committee.len(),
            candidates = candidates.len(),
            stake_per_validator = stake.as_u64(),
            commit_deadline = round.commit_deadline,
            reveal_deadline = round.reveal_deadline,
            seed = hex::encode(&seed[..8]),
            "🗳️ Validation round opened"
        );
        Ok(round)
    }

    /// Record a validator's sealed vote
    pub async fn commit_vote(&self, job_id: JobId, validator: Address, commitment: Hash) -> Result<()> {
        let now = self.clock.now();
        let handle = self.round_handle(job_id).await?;
        let mut round = handle.lock().await;

        if round.status != RoundStatus::Open {
            return Err(ConsensusError::RoundClosed(job_id));
        }
        if !round.is_member(&validator) {
            return Err(ConsensusError::NotInCommittee { validator, job_id });
        }
        if now >= round.commit_deadline {
            return Err(ConsensusError::CommitPhaseClosed {
                job_id,
                deadline: round.commit_deadline,
            });
        }
        if round.commitments.contains_key(&validator) {
            return Err(ConsensusError::AlreadyCommitted { validator, job_id });
        }

        round.commitments.insert(validator, commitment);
        if let Some(ref counter) = self.votes_committed_total {
            counter.inc();
        }

        info!(
            job_id = %job_id,
            validator = %validator.short(),
            commitment = hex::encode(&commitment[..8]),
            commits = round.commitments.len(),
            committee_size = round.committee.len(),
            "📝 Vote committed"
        );
        Ok(())
    }

    /// Open a sealed vote; it must hash to the stored commitment
    pub async fn reveal_vote(
        &self,
        job_id: JobId,
        validator: Address,
        vote: Vote,
        salt: [u8; 32],
    ) -> Result<RevealReceipt> {
        let now = self.clock.now();
        let handle = self.round_handle(job_id).await?;
        let mut round = handle.lock().await;

        if round.status != RoundStatus::Open {
            return Err(ConsensusError::RoundClosed(job_id));
        }
        if !round.is_member(&validator) {
            return Err(ConsensusError::NotInCommittee { validator, job_id });
        }
        if now < round.commit_deadline {
            return Err(ConsensusError::RevealPhaseInvalid(format!(
                "reveal window for {} opens at {}",
                job_id, round.commit_deadline
            )));
        }
        if now >= round.reveal_deadline {
            return Err(ConsensusError::RevealPhaseInvalid(format!(
                "reveal window for {} closed at {}",
                job_id, round.reveal_deadline
            )));
        }
        if round.reveals.contains_key(&validator) {
            return Err(ConsensusError::RevealPhaseInvalid(format!(
                "{} already revealed for {}",
                validator.short(),
                job_id
            )));
        }
        let stored = *round.commitments.get(&validator).ok_or_else(|| {
            ConsensusError::RevealPhaseInvalid(format!(
                "{} has no commitment for {}",
                validator.short(),
                job_id
            ))
        })?;
        let recomputed = compute_commitment(vote, &salt, &validator, job_id);
        if recomputed != stored {
            return Err(ConsensusError::RevealPhaseInvalid(format!(
                "commitment mismatch: expected {}, got {}",
                hex::encode(&stored[..8]),
                hex::encode(&recomputed[..8])
            )));
        }

        let first_reveal = round.reveals.is_empty();
        round.reveals.insert(
            validator,
            RevealedVote {
                vote,
                revealed_at: now,
            },
        );
        match vote {
            Vote::Approve => round.approvals += 1,
            Vote::Reject => round.rejections += 1,
        }
        if let Some(ref counter) = self.votes_revealed_total {
            counter.inc();
        }

        info!(
            job_id = %job_id,
            validator = %validator.short(),
            vote = %vote,
            approvals = round.approvals,
            rejections = round.rejections,
            "🔓 Vote revealed"
        );
        Ok(RevealReceipt {
            first_reveal,
            all_revealed: round.all_revealed(),
        })
    }

    /// Count revealed votes. Allowed once the reveal window has closed or every
    /// member has revealed. Stakes stay locked until [`Self::settle_round`],
    /// except on quorum failure where members are settled immediately.
    pub async fn tally(&self, job_id: JobId) -> Result<TallyReport> {
        let now = self.clock.now();
        let handle = self.round_handle(job_id).await?;
        let mut round = handle.lock().await;

        if round.status != RoundStatus::Open {
            return Err(ConsensusError::RoundClosed(job_id));
        }
        if !round.can_tally(now) {
            return Err(ConsensusError::RevealWindowOpen {
                job_id,
                closes_at: round.reveal_deadline,
            });
        }

        let total = round.approvals + round.rejections;
        let outcome = if total == 0 {
            RoundOutcome::QuorumNotReached
        } else if round
            .params
            .approval_threshold
            .is_met_by(round.approvals, total)
        {
            RoundOutcome::Approved
        } else {
            RoundOutcome::Rejected
        };
        round.outcome = outcome;
        round.status = RoundStatus::Tallied;
        round.tallied_at = Some(now);

        let participating = match outcome.as_success() {
            Some(success) => Self::matching_voters(&round, success),
            None => Vec::new(),
        };

        let settlements = if outcome == RoundOutcome::QuorumNotReached {
            if let Some(ref counter) = self.quorum_failures_total {
                counter.inc();
            }
            warn!(
                job_id = %job_id,
                committee_size = round.committee.len(),
                commits = round.commitments.len(),
                "⏳ Quorum not reached"
            );
            let (_, settlements) = self.settle_members(&mut round, None).await?;
            settlements
        } else {
            info!(
                job_id = %job_id,
                outcome = ?outcome,
                approvals = round.approvals,
                rejections = round.rejections,
                threshold_bps = round.params.approval_threshold.value(),
                "📊 Round tallied"
            );
            Vec::new()
        };

        Ok(TallyReport {
            job_id,
            params_version: round.params_version,
            outcome,
            approvals: round.approvals,
            rejections: round.rejections,
            committee: round.committee.clone(),
            participating,
            tallied_at: now,
            settlements,
        })
    }

    /// Release or slash committee stakes against the final outcome, which may
    /// differ from the tally when a dispute overrode it.
    pub async fn settle_round(&self, job_id: JobId, final_success: bool) -> Result<RoundSettlement> {
        let handle = self.round_handle(job_id).await?;
        let mut round = handle.lock().await;

        match round.status {
            RoundStatus::Tallied => {}
            RoundStatus::Open => return Err(ConsensusError::NotTallied(job_id)),
            RoundStatus::Settled | RoundStatus::Cancelled => {
                return Err(ConsensusError::RoundClosed(job_id))
            }
        }

        let (rewarded, settlements) = self.settle_members(&mut round, Some(final_success)).await?;
        Ok(RoundSettlement {
            job_id,
            final_success: Some(final_success),
            rewarded,
            settlements,
        })
    }

    /// Withdraw the round's authority: every locked stake is released with no
    /// reward or penalty. Recorded commitments and reveals are kept.
    pub async fn cancel_round(&self, job_id: JobId) -> Result<RoundSettlement> {
        let handle = self.round_handle(job_id).await?;
        let mut round = handle.lock().await;

        if !matches!(round.status, RoundStatus::Open | RoundStatus::Tallied) {
            return Err(ConsensusError::RoundClosed(job_id));
        }

        let mut settlements = Vec::with_capacity(round.committee.len());
        for validator in round.committee.clone() {
            self.stakes
                .unlock_stake(validator, Role::Validator, round.stake_per_validator)
                .await?;
            settlements.push(ValidatorSettlement {
                validator,
                verdict: Verdict::Released,
                unlocked: round.stake_per_validator,
                slash: None,
            });
        }
        round.status = RoundStatus::Cancelled;

        info!(
            job_id = %job_id,
            released = settlements.len(),
            commits_kept = round.commitments.len(),
            reveals_kept = round.reveals.len(),
            "🚫 Validation round cancelled"
        );
        Ok(RoundSettlement {
            job_id,
            final_success: None,
            rewarded: Vec::new(),
            settlements,
        })
    }

    fn matching_voters(round: &ValidationRound, success: bool) -> Vec<Address> {
        round
            .committee
            .iter()
            .filter(|v| round.vote_of(v).map(|vote| vote.is_approve()) == Some(success))
            .copied()
            .collect()
    }

    async fn settle_members(
        &self,
        round: &mut ValidationRound,
        final_success: Option<bool>,
    ) -> Result<(Vec<Address>, Vec<ValidatorSettlement>)> {
        let mut rewarded = Vec::new();
        let mut settlements = Vec::with_capacity(round.committee.len());
        let stake = round.stake_per_validator;

        for validator in round.committee.clone() {
            let verdict = match (round.vote_of(&validator), final_success) {
                (Some(vote), Some(success)) if vote.is_approve() == success => Verdict::Rewarded,
                (Some(_), Some(_)) => Verdict::Dissented,
                (Some(_), None) => Verdict::Released,
                (None, _) if round.commitments.contains_key(&validator) => Verdict::NotRevealed,
                (None, _) => Verdict::NotCommitted,
            };
            let penalty_bps = match verdict {
                Verdict::Dissented => round.slash_bps,
                Verdict::NotRevealed | Verdict::NotCommitted => round.non_reveal_penalty_bps,
                Verdict::Rewarded | Verdict::Released => BasisPoints::ZERO,
            };
            let penalty = stake.mul_bps(penalty_bps);

            let slash = if penalty.is_zero() {
                None
            } else {
                Some(
                    self.stakes
                        .slash(validator, Role::Validator, penalty, round.employer)
                        .await?,
                )
            };
            let unlocked = stake.saturating_sub(penalty);
            self.stakes
                .unlock_stake(validator, Role::Validator, unlocked)
                .await?;

            if verdict == Verdict::Rewarded {
                rewarded.push(validator);
            }
            debug!(
                job_id = %round.job_id,
                validator = %validator.short(),
                verdict = ?verdict,
                slashed = penalty.as_u64(),
                unlocked = unlocked.as_u64(),
                "Validator stake settled"
            );
            settlements.push(ValidatorSettlement {
                validator,
                verdict,
                unlocked,
                slash,
            });
        }
        round.status = RoundStatus::Settled;

        info!(
            job_id = %round.job_id,
            final_success = ?final_success,
            rewarded = rewarded.len(),
            penalised = settlements.iter().filter(|s| s.slash.is_some()).count(),
            "⚖️ Round settled"
        );
        Ok((rewarded, settlements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConsensusParams;
    use agora_economics::{EconomicsEngine, LedgerConfig};
    use agora_types::ManualClock;
    use agora_vrf::DeterministicBeacon;

    struct Fixture {
        engine: ValidationEngine,
        economics: EconomicsEngine,
        clock: Arc<ManualClock>,
        validators: Vec<Address>,
        employer: Address,
    }

    async fn fixture(n: u8) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000));
        let economics = EconomicsEngine::new(LedgerConfig::default()).unwrap();
        let owner = Address::from_label("owner");
        let params = ConsensusParams {
            commit_window_secs: 100,
            reveal_window_secs: 100,
            min_committee_size: 3,
            max_committee_size: 3,
            ..ConsensusParams::default()
        };
        let registry = Arc::new(ParamsRegistry::new(owner, params).unwrap());
        let engine = ValidationEngine::new(
            registry,
            economics.stakes.clone(),
            Arc::new(DeterministicBeacon::default()),
            clock.clone(),
        );

        let mut validators = Vec::new();
        for i in 0..n {
            let v = Address::from_bytes([i + 10; 32]);
            economics.balances.mint(v, Amount::new(100)).await.unwrap();
            economics
                .stakes
                .deposit_stake(v, Role::Validator, Amount::new(100))
                .await
                .unwrap();
            engine.register_validator(v).await.unwrap();
            validators.push(v);
        }
        Fixture {
            engine,
            economics,
            clock,
            validators,
            employer: Address::from_label("employer"),
        }
    }

    fn request(job: u64, employer: Address) -> RoundRequest {
        RoundRequest {
            job_id: JobId::new(job),
            employer,
            excluded: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_open_round_locks_committee_stake() {
        let f = fixture(4).await;
        let round = f.engine.open_round(request(1, f.employer)).await.unwrap();
        assert_eq!(round.committee.len(), 3);

        for v in &round.committee {
            let account = f.economics.stakes.get_account(*v, Role::Validator).await;
            assert_eq!(account.locked, Amount::new(10));
        }
        assert!(matches!(
            f.engine.open_round(request(1, f.employer)).await,
            Err(ConsensusError::RoundExists(_))
        ));
    }

    #[tokio::test]
    async fn test_excluded_validators_never_selected() {
        let f = fixture(4).await;
        let mut req = request(2, f.employer);
        req.excluded.insert(f.validators[0]);
        let round = f.engine.open_round(req).await.unwrap();
        assert!(!round.committee.contains(&f.validators[0]));

        let mut req = request(3, f.employer);
        req.excluded.insert(f.validators[1]);
        req.excluded.insert(f.validators[2]);
        assert!(matches!(
            f.engine.open_round(req).await,
            Err(ConsensusError::InsufficientValidators { needed: 3, available: 2 })
        ));
    }

    #[tokio::test]
    async fn test_commit_rules() {
        let f = fixture(3).await;
        let round = f.engine.open_round(request(1, f.employer)).await.unwrap();
        let v = round.committee[0];
        let c = compute_commitment(Vote::Approve, &[1; 32], &v, JobId::new(1));

        f.engine.commit_vote(JobId::new(1), v, c).await.unwrap();
        assert!(matches!(
            f.engine.commit_vote(JobId::new(1), v, c).await,
            Err(ConsensusError::AlreadyCommitted { .. })
        ));
        assert!(matches!(
            f.engine
                .commit_vote(JobId::new(1), Address::from_label("outsider"), c)
                .await,
            Err(ConsensusError::NotInCommittee { .. })
        ));

        f.clock.advance(100);
        let late = round.committee[1];
        assert!(matches!(
            f.engine.commit_vote(JobId::new(1), late, c).await,
            Err(ConsensusError::CommitPhaseClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_reveal_window_and_tally() {
        let f = fixture(3).await;
        let job = JobId::new(5);
        let round = f.engine.open_round(request(5, f.employer)).await.unwrap();
        let votes = [Vote::Approve, Vote::Approve, Vote::Reject];
        for (v, vote) in round.committee.iter().zip(votes) {
            let c = compute_commitment(vote, &[7; 32], v, job);
            f.engine.commit_vote(job, *v, c).await.unwrap();
        }

        // Reveals are refused during the commit phase
        assert!(matches!(
            f.engine
                .reveal_vote(job, round.committee[0], Vote::Approve, [7; 32])
                .await,
            Err(ConsensusError::RevealPhaseInvalid(_))
        ));

        f.clock.advance(100);
        let receipt = f
            .engine
            .reveal_vote(job, round.committee[0], Vote::Approve, [7; 32])
            .await
            .unwrap();
        assert!(receipt.first_reveal);

        // Not everyone revealed and the window is open
        assert!(matches!(
            f.engine.tally(job).await,
            Err(ConsensusError::RevealWindowOpen { .. })
        ));

        f.engine
            .reveal_vote(job, round.committee[1], Vote::Approve, [7; 32])
            .await
            .unwrap();
        let receipt = f
            .engine
            .reveal_vote(job, round.committee[2], Vote::Reject, [7; 32])
            .await
            .unwrap();
        assert!(receipt.all_revealed);

        let report = f.engine.tally(job).await.unwrap();
        assert_eq!(report.outcome, RoundOutcome::Approved);
        assert_eq!(report.approvals, 2);
        assert_eq!(report.participating, round.committee[..2].to_vec());
        assert!(report.settlements.is_empty());

        // Stakes remain locked until settlement
        let account = f
            .economics
            .stakes
            .get_account(round.committee[2], Role::Validator)
            .await;
        assert_eq!(account.locked, Amount::new(10));

        let settlement = f.engine.settle_round(job, true).await.unwrap();
        assert_eq!(settlement.rewarded, round.committee[..2].to_vec());
        let dissenter = &settlement.settlements[2];
        assert_eq!(dissenter.verdict, Verdict::Dissented);
        // 10% of the 10 locked
        assert_eq!(dissenter.slash.unwrap().amount, Amount::new(1));
        let account = f
            .economics
            .stakes
            .get_account(round.committee[2], Role::Validator)
            .await;
        assert_eq!(account.locked, Amount::ZERO);
        assert_eq!(account.total, Amount::new(99));
    }

    #[tokio::test]
    async fn test_zero_reveals_is_quorum_failure() {
        let f = fixture(3).await;
        let job = JobId::new(9);
        let round = f.engine.open_round(request(9, f.employer)).await.unwrap();
        let v = round.committee[0];
        f.engine
            .commit_vote(job, v, compute_commitment(Vote::Approve, &[1; 32], &v, job))
            .await
            .unwrap();

        f.clock.advance(200);
        let report = f.engine.tally(job).await.unwrap();
        assert_eq!(report.outcome, RoundOutcome::QuorumNotReached);
        assert_eq!(report.settlements.len(), 3);
        assert_eq!(report.settlements[0].verdict, Verdict::NotRevealed);
        assert_eq!(report.settlements[1].verdict, Verdict::NotCommitted);
        assert_eq!(
            f.engine.get_round(job).await.unwrap().status,
            RoundStatus::Settled
        );
        // Silent members lose 10% of the 10 locked
        assert_eq!(report.settlements[0].slash.unwrap().amount, Amount::new(1));
        assert_eq!(report.settlements[1].slash.unwrap().amount, Amount::new(1));
        let account = f.economics.stakes.get_account(v, Role::Validator).await;
        assert_eq!(account.locked, Amount::ZERO);
        assert_eq!(account.total, Amount::new(99));
    }

    #[tokio::test]
    async fn test_cancel_keeps_votes_and_releases_stake() {
        let f = fixture(3).await;
        let job = JobId::new(11);
        let round = f.engine.open_round(request(11, f.employer)).await.unwrap();
        let v = round.committee[0];
        f.engine
            .commit_vote(job, v, compute_commitment(Vote::Reject, &[2; 32], &v, job))
            .await
            .unwrap();

        let settlement = f.engine.cancel_round(job).await.unwrap();
        assert!(settlement
            .settlements
            .iter()
            .all(|s| s.verdict == Verdict::Released));

        let kept = f.engine.get_round(job).await.unwrap();
        assert_eq!(kept.status, RoundStatus::Cancelled);
        assert!(kept.commitments.contains_key(&v));
        assert_eq!(
            f.economics.stakes.get_account(v, Role::Validator).await.locked,
            Amount::ZERO
        );
        assert!(matches!(
            f.engine.commit_vote(job, round.committee[1], [0; 32]).await,
            Err(ConsensusError::RoundClosed(_))
        ));
    }
}
