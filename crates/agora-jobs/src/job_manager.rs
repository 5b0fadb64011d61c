use crate::settlement::{plan_failure, plan_success};
use crate::types::*;
use crate::{
    CertificateIssuer, Dispute, DisputeConfig, DisputeManager, EventLog, FeePool,
    ForceFinalizePolicy, IdentityOracle, JobConfig, JobError, ProtocolEvent, Receipt,
    ReputationTracker, Result,
};
use agora_consensus::{
    ConsensusParams, RoundOutcome, RoundRequest, RoundStatus, ValidationEngine,
    ValidatorSettlement, Verdict, Vote,
};
use agora_economics::{EscrowKind, EscrowManager, Payout, SlashReceipt, StakeAccount, StakeLedger};
use agora_types::{Address, Amount, Clock, Hash, JobId, Role, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Services the orchestrator consults but does not own
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityOracle>,
    pub reputation: Arc<dyn ReputationTracker>,
    pub certificates: Arc<dyn CertificateIssuer>,
    pub fee_pool: Arc<dyn FeePool>,
}

/// Top-level job state machine. Holds the ledger, the validation engine and
/// the dispute records; none of them call back into it.
pub struct JobManager {
    config: JobConfig,
    clock: Arc<dyn Clock>,
    escrow: Arc<EscrowManager>,
    stakes: Arc<StakeLedger>,
    engine: Arc<ValidationEngine>,
    disputes: DisputeManager,
    collaborators: Collaborators,
    events: Arc<EventLog>,

    /// One mutex per job serializes every operation on that job
    jobs: Arc<RwLock<HashMap<JobId, Arc<Mutex<Job>>>>>,
    next_id: Arc<Mutex<JobId>>,

    // Metrics
    pub jobs_created_total: Option<Arc<prometheus::IntCounter>>,
    pub jobs_finalized_total: Option<Arc<prometheus::IntCounter>>,
    pub disputes_raised_total: Option<Arc<prometheus::IntCounter>>,
    pub force_finalizations_total: Option<Arc<prometheus::IntCounter>>,
}

impl JobManager {
    pub fn new(
        config: JobConfig,
        dispute_config: DisputeConfig,
        escrow: Arc<EscrowManager>,
        stakes: Arc<StakeLedger>,
        engine: Arc<ValidationEngine>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if engine.params().owner() != config.owner {
            return Err(JobError::InvalidParameters(format!(
                "consensus parameters owner {} differs from protocol owner {}",
                engine.params().owner().short(),
                config.owner.short()
            )));
        }
        Ok(Self {
            config,
            clock,
            disputes: DisputeManager::new(dispute_config, escrow.clone()),
            escrow,
            stakes,
            engine,
            collaborators,
            events: Arc::new(EventLog::new()),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(JobId::new(1))),
            jobs_created_total: None,
            jobs_finalized_total: None,
            disputes_raised_total: None,
            force_finalizations_total: None,
        })
    }

    /// Set metrics for job lifecycle tracking
    pub fn set_metrics(
        &mut self,
        jobs_created_total: Arc<prometheus::IntCounter>,
        jobs_finalized_total: Arc<prometheus::IntCounter>,
        disputes_raised_total: Arc<prometheus::IntCounter>,
        force_finalizations_total: Arc<prometheus::IntCounter>,
    ) {
        self.jobs_created_total = Some(jobs_created_total);
        self.jobs_finalized_total = Some(jobs_finalized_total);
        self.disputes_raised_total = Some(disputes_raised_total);
        self.force_finalizations_total = Some(force_finalizations_total);
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn engine(&self) -> &Arc<ValidationEngine> {
        &self.engine
    }

    pub async fn get_job(&self, job_id: JobId) -> Option<Job> {
        let handle = self.jobs.read().await.get(&job_id).cloned()?;
        let job = handle.lock().await;
        Some(job.clone())
    }

    pub async fn jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        let handles: Vec<_> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::new();
        for handle in handles {
            let job = handle.lock().await;
            if job.status == status {
                jobs.push(job.clone());
            }
        }
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub async fn get_dispute(&self, job_id: JobId) -> Option<Dispute> {
        self.disputes.get(job_id).await
    }

    async fn job_handle(&self, job_id: JobId) -> Result<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(JobError::JobNotFound(job_id))
    }

    async fn record<T>(&self, value: T, events: Vec<ProtocolEvent>, now: Timestamp) -> Receipt<T> {
        self.events.append(&events, now).await;
        Receipt::new(value, events)
    }

    /// Escrow the reward and publish the job
    pub async fn create_job(&self, request: NewJob) -> Result<Receipt<Job>> {
        let start = std::time::Instant::now();
        let now = self.clock.now();

        if request.reward.is_zero() {
            return Err(JobError::InvalidParameters(
                "reward must be positive".to_string(),
            ));
        }
        if request.deadline <= now {
            return Err(JobError::InvalidParameters(format!(
                "deadline {} is not in the future (now {})",
                request.deadline, now
            )));
        }
        let min_stake = self.stakes.role_params(Role::Agent).min_stake;
        let required_agent_stake = request.required_agent_stake.unwrap_or(min_stake);
        if required_agent_stake < min_stake || required_agent_stake.is_zero() {
            return Err(JobError::InvalidParameters(format!(
                "required agent stake {} is below the agent minimum {}",
                required_agent_stake, min_stake
            )));
        }

        // Held across the escrow lock so ids are never skipped
        let mut next_id = self.next_id.lock().await;
        let job_id = *next_id;
        let escrow_lock = self
            .escrow
            .lock(
                EscrowKind::JobReward {
                    job_id,
                    employer: request.employer,
                },
                request.reward,
                now,
            )
            .await?;
        *next_id = job_id.next();
        drop(next_id);

        let job = Job {
            id: job_id,
            employer: request.employer,
            agent: None,
            reward: request.reward,
            required_agent_stake,
            fee_bps: request.fee_bps.unwrap_or(self.config.default_fee_bps),
            agent_share_bps: request
                .agent_share_bps
                .unwrap_or(self.config.default_agent_share_bps),
            status: JobStatus::Created,
            success: None,
            deadline: request.deadline,
            created_at: now,
            assigned_at: None,
            submitted_at: None,
            finalized_at: None,
            content_hash: request.content_hash,
            result_hash: None,
            burn_receipt: request.burn_receipt,
            escrow_lock,
            round_outcome: None,
            pending: None,
            certificate_id: None,
        };
        self.jobs
            .write()
            .await
            .insert(job_id, Arc::new(Mutex::new(job.clone())));

        if let Some(ref counter) = self.jobs_created_total {
            counter.inc();
        }

        info!(
            job_id = %job_id,
            employer = %job.employer.short(),
            reward = job.reward.as_u64(),
            required_agent_stake = required_agent_stake.as_u64(),
            deadline = job.deadline,
            duration_ms = start.elapsed().as_millis() as u64,
            "📋 Job created"
        );

        let events = vec![ProtocolEvent::JobCreated {
            job_id,
            employer: job.employer,
            reward: job.reward,
            required_agent_stake,
            deadline: job.deadline,
            content_hash: hex::encode(job.content_hash),
        }];
        Ok(self.record(job, events, now).await)
    }

    /// Assign the job to an identity-verified agent and lock the agent's stake
    pub async fn apply_for_job(
        &self,
        job_id: JobId,
        agent: Address,
        proof: &[u8],
    ) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Created], "apply")?;
        if now > job.deadline {
            return Err(JobError::DeadlinePassed {
                job_id,
                deadline: job.deadline,
            });
        }
        if agent == job.employer {
            return Err(JobError::Unauthorized(format!(
                "employer {} cannot take its own job",
                agent.short()
            )));
        }
        if !self
            .collaborators
            .identity
            .is_eligible(agent, Role::Agent, proof)
            .await
            || self.collaborators.reputation.is_blacklisted(agent).await
        {
            return Err(JobError::IdentityRejected {
                address: agent,
                role: Role::Agent,
            });
        }

        self.stakes
            .lock_stake(agent, Role::Agent, job.required_agent_stake)
            .await?;
        transition(&mut job, JobStatus::Applied)?;
        job.agent = Some(agent);
        job.assigned_at = Some(now);

        info!(
            job_id = %job_id,
            agent = %agent.short(),
            stake_locked = job.required_agent_stake.as_u64(),
            "🙋 Agent assigned"
        );

        let events = vec![ProtocolEvent::JobApplied {
            job_id,
            agent,
            stake_locked: job.required_agent_stake,
        }];
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Record the agent's result and open the validation round in the same step
    pub async fn submit_result(
        &self,
        job_id: JobId,
        caller: Address,
        result_hash: Hash,
    ) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Applied], "submit")?;
        if job.agent != Some(caller) {
            return Err(JobError::OnlyAgent { job_id, caller });
        }
        if now > job.deadline {
            return Err(JobError::DeadlinePassed {
                job_id,
                deadline: job.deadline,
            });
        }

        let mut excluded = BTreeSet::from([job.employer, caller]);
        for validator in self.engine.registered_validators().await {
            if self.collaborators.reputation.is_blacklisted(validator).await {
                excluded.insert(validator);
            }
        }
        let round = self
            .engine
            .open_round(RoundRequest {
                job_id,
                employer: job.employer,
                excluded,
            })
            .await?;

        transition(&mut job, JobStatus::Submitted)?;
        job.result_hash = Some(result_hash);
        job.submitted_at = Some(now);

        info!(
            job_id = %job_id,
            agent = %caller.short(),
            result = hex::encode(&result_hash[..8]),
            committee_size = round.committee.len(),
            "📤 Result submitted"
        );

        let events = vec![
            ProtocolEvent::ResultSubmitted {
                job_id,
                agent: caller,
                result_hash: hex::encode(result_hash),
            },
            ProtocolEvent::CommitteeSelected {
                job_id,
                committee: round.committee.clone(),
                params_version: round.params_version,
                commit_deadline: round.commit_deadline,
                reveal_deadline: round.reveal_deadline,
            },
        ];
        Ok(self.record(job.clone(), events, now).await)
    }

    pub async fn commit_vote(
        &self,
        job_id: JobId,
        validator: Address,
        commitment: Hash,
    ) -> Result<Receipt<()>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let job = handle.lock().await;

        require_status(&job, &[JobStatus::Submitted, JobStatus::Validating], "commit")?;
        self.engine.commit_vote(job_id, validator, commitment).await?;

        let events = vec![ProtocolEvent::VoteCommitted { job_id, validator }];
        Ok(self.record((), events, now).await)
    }

    /// Reveal a committed vote. The reveal that completes the committee tallies
    /// the round; the returned outcome is set when that happened.
    pub async fn reveal_vote(
        &self,
        job_id: JobId,
        validator: Address,
        vote: Vote,
        salt: [u8; 32],
    ) -> Result<Receipt<Option<RoundOutcome>>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Submitted, JobStatus::Validating], "reveal")?;
        let receipt = self.engine.reveal_vote(job_id, validator, vote, salt).await?;

        // Staged on a copy; the guarded job only changes once the tally succeeded
        let mut next = job.clone();
        let mut events = vec![ProtocolEvent::VoteRevealed {
            job_id,
            validator,
            vote,
        }];
        let outcome = if receipt.all_revealed {
            Some(self.tally_locked(&mut next, now, &mut events).await?)
        } else {
            None
        };
        if next.status == JobStatus::Submitted {
            transition(&mut next, JobStatus::Validating)?;
        }
        *job = next;
        Ok(self.record(outcome, events, now).await)
    }

    /// Count the round once its reveal window has closed
    pub async fn tally_round(&self, job_id: JobId) -> Result<Receipt<RoundOutcome>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Submitted, JobStatus::Validating], "tally")?;
        if job.pending.is_some() {
            return Err(invalid_status(&job, "tally"));
        }

        let mut events = Vec::new();
        let outcome = self.tally_locked(&mut job, now, &mut events).await?;
        Ok(self.record(outcome, events, now).await)
    }

    /// Settle a tallied outcome whose dispute window has closed
    pub async fn finalize_job(&self, job_id: JobId) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Validating], "finalize")?;
        let pending = job
            .pending
            .clone()
            .ok_or_else(|| invalid_status(&job, "finalize"))?;
        if now < pending.dispute_deadline {
            return Err(JobError::DisputeWindowOpen {
                job_id,
                closes_at: pending.dispute_deadline,
            });
        }

        let mut events = Vec::new();
        self.settle_outcome(&mut job, pending.success, now, &mut events)
            .await?;
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Owner escape hatch for jobs whose validation never produced an outcome.
    /// A round whose reveal window has closed is tallied first; if its
    /// committee decided, that outcome stands instead.
    pub async fn force_finalize(&self, job_id: JobId, caller: Address) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        if caller != self.config.owner {
            return Err(JobError::Unauthorized(format!(
                "{} may not force finalize",
                caller.short()
            )));
        }
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(
            &job,
            &[JobStatus::Submitted, JobStatus::Validating],
            "force_finalize",
        )?;
        if job.pending.is_some() {
            return Err(invalid_status(&job, "force_finalize"));
        }
        let round = self
            .engine
            .get_round(job_id)
            .await
            .ok_or_else(|| invalid_status(&job, "force_finalize"))?;

        let mut next = job.clone();
        let mut events = Vec::new();
        if round.status == RoundStatus::Open {
            if !round.can_tally(now) {
                return Err(JobError::ForceFinalizeTooEarly {
                    job_id,
                    allowed_after: round.reveal_deadline,
                });
            }
            let outcome = self.tally_locked(&mut next, now, &mut events).await?;
            if outcome.as_success().is_some() {
                *job = next;
                return Ok(self.record(job.clone(), events, now).await);
            }
        } else if job.round_outcome != Some(RoundOutcome::QuorumNotReached) {
            return Err(invalid_status(&job, "force_finalize"));
        }

        let policy = self.config.force_finalize_policy;
        events.push(ProtocolEvent::ForceFinalized { job_id, policy });
        match policy {
            ForceFinalizePolicy::FavorEmployer => {
                self.settle_outcome(&mut next, false, now, &mut events).await?
            }
            ForceFinalizePolicy::Refund => self.settle_refund(&mut next, now, &mut events).await?,
        }
        *job = next;

        if let Some(ref counter) = self.force_finalizations_total {
            counter.inc();
        }
        warn!(
            job_id = %job_id,
            policy = %policy,
            round_outcome = ?job.round_outcome,
            "🧯 Job force finalized"
        );
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Challenge a job's outcome, or its result before an outcome exists.
    /// Suspends every other finalization path until the moderator rules.
    pub async fn raise_dispute(
        &self,
        job_id: JobId,
        caller: Address,
        evidence_hash: Hash,
    ) -> Result<Receipt<Dispute>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Submitted, JobStatus::Validating], "dispute")?;
        let agent = job.agent.ok_or_else(|| invalid_status(&job, "dispute"))?;
        if !job.is_party(&caller) {
            return Err(JobError::Unauthorized(format!(
                "{} is not a party to {}",
                caller.short(),
                job_id
            )));
        }

        match &job.pending {
            Some(pending) => {
                if now >= pending.dispute_deadline {
                    return Err(JobError::DisputeWindowClosed {
                        job_id,
                        closed_at: pending.dispute_deadline,
                    });
                }
                let adverse_to = if pending.success { job.employer } else { agent };
                if caller != adverse_to {
                    return Err(JobError::Unauthorized(format!(
                        "the pending outcome of {} is not adverse to {}",
                        job_id,
                        caller.short()
                    )));
                }
            }
            None => {
                let closes_at = job
                    .submitted_at
                    .unwrap_or(now)
                    .saturating_add(self.disputes.config().window_secs);
                if now >= closes_at {
                    return Err(JobError::DisputeWindowClosed {
                        job_id,
                        closed_at: closes_at,
                    });
                }
            }
        }

        let dispute = self
            .disputes
            .raise(job_id, caller, evidence_hash, now)
            .await?;

        let mut events = vec![ProtocolEvent::DisputeRaised {
            job_id,
            raised_by: caller,
            evidence_hash: hex::encode(evidence_hash),
            bond: dispute.bond,
        }];
        // An open round loses its authority; a tallied one keeps its stakes
        // locked until the ruling settles them.
        if matches!(
            self.engine.get_round(job_id).await.map(|r| r.status),
            Some(RoundStatus::Open)
        ) {
            let cancelled = self.engine.cancel_round(job_id).await?;
            self.record_validators(job_id, &cancelled.settlements, &[], &mut events)
                .await;
        }
        transition(&mut job, JobStatus::Disputed)?;

        if let Some(ref counter) = self.disputes_raised_total {
            counter.inc();
        }
        Ok(self.record(dispute, events, now).await)
    }

    /// Moderator ruling. Overrides whatever the committee tallied.
    pub async fn resolve_dispute(
        &self,
        job_id: JobId,
        caller: Address,
        employer_wins: bool,
    ) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        self.disputes.authorize(caller)?;
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Disputed], "resolve")?;
        let agent = job.agent.ok_or_else(|| invalid_status(&job, "resolve"))?;

        let mut settled = Vec::new();
        self.settle_outcome(&mut job, !employer_wins, now, &mut settled)
            .await?;
        let resolution = self
            .disputes
            .resolve(job_id, job.employer, agent, employer_wins, now)
            .await?;

        let mut events = vec![ProtocolEvent::DisputeResolved {
            job_id,
            employer_wins,
            bond_recipient: resolution.bond_recipient,
        }];
        events.extend(settled);
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Employer withdraws the job before anyone took it
    pub async fn cancel_job(&self, job_id: JobId, caller: Address) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(&job, &[JobStatus::Created], "cancel")?;
        if caller != job.employer {
            return Err(JobError::Unauthorized(format!(
                "only the employer may cancel {}",
                job_id
            )));
        }

        let refunded = self.escrow.refund(&job.escrow_lock).await?;
        transition(&mut job, JobStatus::Cancelled)?;
        job.finalized_at = Some(now);

        info!(
            job_id = %job_id,
            employer = %job.employer.short(),
            refunded = refunded.as_u64(),
            "🚫 Job cancelled"
        );
        let events = vec![ProtocolEvent::JobCancelled { job_id, refunded }];
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Anyone may expire a job whose deadline passed without an outcome
    pub async fn expire_job(&self, job_id: JobId) -> Result<Receipt<Job>> {
        let now = self.clock.now();
        let handle = self.job_handle(job_id).await?;
        let mut job = handle.lock().await;

        require_status(
            &job,
            &[
                JobStatus::Created,
                JobStatus::Applied,
                JobStatus::Submitted,
                JobStatus::Validating,
            ],
            "expire",
        )?;
        if job.pending.is_some() {
            return Err(invalid_status(&job, "expire"));
        }
        if now <= job.deadline {
            return Err(JobError::DeadlineNotReached {
                job_id,
                deadline: job.deadline,
            });
        }

        let mut events = Vec::new();
        if matches!(
            self.engine.get_round(job_id).await.map(|r| r.status),
            Some(RoundStatus::Open | RoundStatus::Tallied)
        ) {
            let cancelled = self.engine.cancel_round(job_id).await?;
            self.record_validators(job_id, &cancelled.settlements, &[], &mut events)
                .await;
        }

        let refunded = self.escrow.refund(&job.escrow_lock).await?;
        let mut agent_stake_released = Amount::ZERO;
        if let Some(agent) = job.agent {
            self.stakes
                .unlock_stake(agent, Role::Agent, job.required_agent_stake)
                .await?;
            agent_stake_released = job.required_agent_stake;
            if job.status == JobStatus::Applied {
                self.collaborators
                    .reputation
                    .adjust(agent, -self.config.abandonment_penalty)
                    .await;
            }
        }
        let previous = job.status;
        transition(&mut job, JobStatus::Expired)?;
        job.finalized_at = Some(now);

        info!(
            job_id = %job_id,
            previous_status = ?previous,
            refunded = refunded.as_u64(),
            agent_stake_released = agent_stake_released.as_u64(),
            "⌛ Job expired"
        );
        events.push(ProtocolEvent::JobExpired {
            job_id,
            refunded,
            agent_stake_released,
        });
        Ok(self.record(job.clone(), events, now).await)
    }

    /// Publish new consensus parameters for rounds opened from now on
    pub async fn update_params(
        &self,
        caller: Address,
        params: ConsensusParams,
    ) -> Result<Receipt<u32>> {
        let now = self.clock.now();
        let version = self.engine.params().update(caller, params).await?;
        let events = vec![ProtocolEvent::ParamsUpdated { version }];
        Ok(self.record(version, events, now).await)
    }

    pub async fn deposit_stake(
        &self,
        participant: Address,
        role: Role,
        amount: Amount,
    ) -> Result<Receipt<StakeAccount>> {
        let now = self.clock.now();
        let account = self.stakes.deposit_stake(participant, role, amount).await?;
        let events = vec![ProtocolEvent::StakeDeposited {
            participant,
            role,
            amount,
        }];
        Ok(self.record(account, events, now).await)
    }

    pub async fn withdraw_stake(
        &self,
        participant: Address,
        role: Role,
        amount: Amount,
    ) -> Result<Receipt<StakeAccount>> {
        let now = self.clock.now();
        let account = self.stakes.withdraw_stake(participant, role, amount).await?;
        let events = vec![ProtocolEvent::StakeWithdrawn {
            participant,
            role,
            amount,
        }];
        Ok(self.record(account, events, now).await)
    }

    /// Join the validator pool after an identity check
    pub async fn register_validator(&self, validator: Address, proof: &[u8]) -> Result<Receipt<()>> {
        let now = self.clock.now();
        if !self
            .collaborators
            .identity
            .is_eligible(validator, Role::Validator, proof)
            .await
            || self.collaborators.reputation.is_blacklisted(validator).await
        {
            return Err(JobError::IdentityRejected {
                address: validator,
                role: Role::Validator,
            });
        }
        self.engine.register_validator(validator).await?;
        let events = vec![ProtocolEvent::ValidatorRegistered { validator }];
        Ok(self.record((), events, now).await)
    }

    async fn tally_locked(
        &self,
        job: &mut Job,
        now: Timestamp,
        events: &mut Vec<ProtocolEvent>,
    ) -> Result<RoundOutcome> {
        let report = self.engine.tally(job.id).await?;
        job.round_outcome = Some(report.outcome);

        match report.outcome.as_success() {
            Some(success) => {
                self.on_validation_result(job, success, report.approvals, report.rejections, now, events)
                    .await?
            }
            None => {
                events.push(ProtocolEvent::RoundTallied {
                    job_id: job.id,
                    outcome: report.outcome,
                    approvals: report.approvals,
                    rejections: report.rejections,
                    dispute_deadline: None,
                });
                events.push(ProtocolEvent::QuorumNotReached {
                    job_id: job.id,
                    committee_size: report.committee.len(),
                });
                self.record_validators(job.id, &report.settlements, &[], events)
                    .await;
                warn!(
                    job_id = %job.id,
                    committee_size = report.committee.len(),
                    "⏳ No valid reveals; job awaits force finalize"
                );
            }
        }
        Ok(report.outcome)
    }

    /// Consumes a decided tally: settles at once when disputes are disabled,
    /// otherwise parks the outcome until its dispute window closes.
    async fn on_validation_result(
        &self,
        job: &mut Job,
        success: bool,
        approvals: u64,
        rejections: u64,
        now: Timestamp,
        events: &mut Vec<ProtocolEvent>,
    ) -> Result<()> {
        let outcome = if success {
            RoundOutcome::Approved
        } else {
            RoundOutcome::Rejected
        };
        let window = self.disputes.config().window_secs;
        if window == 0 {
            events.push(ProtocolEvent::RoundTallied {
                job_id: job.id,
                outcome,
                approvals,
                rejections,
                dispute_deadline: None,
            });
            return self.settle_outcome(job, success, now, events).await;
        }

        let dispute_deadline = now.saturating_add(window);
        if job.status == JobStatus::Submitted {
            transition(job, JobStatus::Validating)?;
        }
        job.pending = Some(PendingOutcome {
            success,
            tallied_at: now,
            dispute_deadline,
        });
        events.push(ProtocolEvent::RoundTallied {
            job_id: job.id,
            outcome,
            approvals,
            rejections,
            dispute_deadline: Some(dispute_deadline),
        });
        info!(
            job_id = %job.id,
            success,
            dispute_deadline,
            "🕰️ Outcome pending dispute window"
        );
        Ok(())
    }

    /// Pay out or slash against a final outcome and close the job
    async fn settle_outcome(
        &self,
        job: &mut Job,
        success: bool,
        now: Timestamp,
        events: &mut Vec<ProtocolEvent>,
    ) -> Result<()> {
        let agent = job.agent.ok_or_else(|| invalid_status(job, "settle"))?;
        if !job.status.can_transition_to(&JobStatus::Finalized) {
            return Err(invalid_status(job, "settle"));
        }

        // Validator stakes against the final outcome. A cancelled round keeps
        // its votes, so matching voters are still paid from the pool.
        let (rewarded, settlements) = match self.engine.get_round(job.id).await {
            Some(round) if round.status == RoundStatus::Tallied => {
                let settlement = self.engine.settle_round(job.id, success).await?;
                (settlement.rewarded, settlement.settlements)
            }
            Some(round) => {
                let matching = round
                    .committee
                    .iter()
                    .filter(|v| round.vote_of(v).map(|vote| vote.is_approve()) == Some(success))
                    .copied()
                    .collect();
                (matching, Vec::new())
            }
            None => (Vec::new(), Vec::new()),
        };

        let plan = if success {
            plan_success(job.reward, job.fee_bps, job.agent_share_bps, &rewarded)
        } else {
            plan_failure(job.reward, job.agent_share_bps, &rewarded)
        };
        let mut payouts = vec![Payout::to(agent, plan.agent_payout), Payout::external(plan.fee)];
        payouts.extend(
            plan.validator_shares
                .iter()
                .map(|(validator, amount)| Payout::to(*validator, *amount)),
        );
        let escrow = self.escrow.settle(&job.escrow_lock, &payouts).await?;
        debug_assert_eq!(escrow.refunded, plan.employer_refund);
        if !plan.fee.is_zero() {
            self.collaborators.fee_pool.deposit_fee(plan.fee).await;
        }

        self.record_validators(job.id, &settlements, &plan.validator_shares, events)
            .await;
        if settlements.is_empty() {
            for validator in &rewarded {
                self.collaborators
                    .reputation
                    .adjust(*validator, self.config.validator_reputation_reward)
                    .await;
            }
        }

        let stake = job.required_agent_stake;
        if success {
            self.stakes.unlock_stake(agent, Role::Agent, stake).await?;
            self.collaborators
                .reputation
                .adjust(agent, self.config.agent_reputation_reward)
                .await;
            let metadata = job.result_hash.unwrap_or(job.content_hash);
            let certificate_id = self
                .collaborators
                .certificates
                .issue(job.id, agent, metadata)
                .await;
            job.certificate_id = Some(certificate_id);
            events.push(ProtocolEvent::CertificateIssued {
                job_id: job.id,
                recipient: agent,
                certificate_id,
            });
        } else {
            let penalty = stake.mul_bps(self.stakes.role_params(Role::Agent).slash_bps);
            if !penalty.is_zero() {
                let receipt = self
                    .stakes
                    .slash(agent, Role::Agent, penalty, job.employer)
                    .await?;
                events.push(slash_event(&receipt));
            }
            self.stakes
                .unlock_stake(agent, Role::Agent, stake.saturating_sub(penalty))
                .await?;
            self.collaborators
                .reputation
                .adjust(agent, -self.config.agent_reputation_penalty)
                .await;
        }

        transition(job, JobStatus::Finalized)?;
        job.success = Some(success);
        job.finalized_at = Some(now);
        job.pending = None;

        if let Some(ref counter) = self.jobs_finalized_total {
            counter.inc();
        }
        info!(
            job_id = %job.id,
            success,
            agent = %agent.short(),
            agent_payout = plan.agent_payout.as_u64(),
            fee = plan.fee.as_u64(),
            validator_pool = plan.validator_pool.as_u64(),
            employer_refund = plan.employer_refund.as_u64(),
            rewarded_validators = rewarded.len(),
            "{} Job finalized",
            if success { "✅" } else { "❌" }
        );
        events.push(ProtocolEvent::JobFinalized {
            job_id: job.id,
            success: Some(success),
            agent_payout: plan.agent_payout,
            fee: plan.fee,
            validator_pool: plan.validator_pool,
            employer_refund: plan.employer_refund,
        });
        Ok(())
    }

    /// Close the job with no outcome: everything goes back where it came from
    async fn settle_refund(
        &self,
        job: &mut Job,
        now: Timestamp,
        events: &mut Vec<ProtocolEvent>,
    ) -> Result<()> {
        if matches!(
            self.engine.get_round(job.id).await.map(|r| r.status),
            Some(RoundStatus::Open | RoundStatus::Tallied)
        ) {
            let cancelled = self.engine.cancel_round(job.id).await?;
            self.record_validators(job.id, &cancelled.settlements, &[], events)
                .await;
        }
        let refunded = self.escrow.refund(&job.escrow_lock).await?;
        if let Some(agent) = job.agent {
            self.stakes
                .unlock_stake(agent, Role::Agent, job.required_agent_stake)
                .await?;
        }

        transition(job, JobStatus::Finalized)?;
        job.success = None;
        job.finalized_at = Some(now);
        if let Some(ref counter) = self.jobs_finalized_total {
            counter.inc();
        }
        events.push(ProtocolEvent::JobFinalized {
            job_id: job.id,
            success: None,
            agent_payout: Amount::ZERO,
            fee: Amount::ZERO,
            validator_pool: Amount::ZERO,
            employer_refund: refunded,
        });
        Ok(())
    }

    /// Turn validator settlements into events and reputation updates
    async fn record_validators(
        &self,
        job_id: JobId,
        settlements: &[ValidatorSettlement],
        rewards: &[(Address, Amount)],
        events: &mut Vec<ProtocolEvent>,
    ) {
        for settlement in settlements {
            let reward = rewards
                .iter()
                .find(|(v, _)| *v == settlement.validator)
                .map(|(_, a)| *a)
                .unwrap_or_default();
            let delta = match settlement.verdict {
                Verdict::Rewarded => self.config.validator_reputation_reward,
                Verdict::Dissented | Verdict::NotRevealed | Verdict::NotCommitted => {
                    -self.config.validator_reputation_penalty
                }
                Verdict::Released => 0,
            };
            if delta != 0 {
                self.collaborators
                    .reputation
                    .adjust(settlement.validator, delta)
                    .await;
            }
            debug!(
                job_id = %job_id,
                validator = %settlement.validator.short(),
                verdict = ?settlement.verdict,
                reward = reward.as_u64(),
                "Validator settlement recorded"
            );
            events.push(ProtocolEvent::ValidatorSettled {
                job_id,
                validator: settlement.validator,
                verdict: settlement.verdict,
                unlocked: settlement.unlocked,
                reward,
            });
            if let Some(receipt) = &settlement.slash {
                events.push(slash_event(receipt));
            }
        }
    }
}

fn invalid_status(job: &Job, operation: &'static str) -> JobError {
    JobError::InvalidStatus {
        job_id: job.id,
        status: job.status,
        operation,
    }
}

/// Terminal jobs never appear in an allowed list, so this also enforces
/// terminality.
fn require_status(job: &Job, allowed: &[JobStatus], operation: &'static str) -> Result<()> {
    if job.status.is_terminal() || !allowed.contains(&job.status) {
        return Err(invalid_status(job, operation));
    }
    Ok(())
}

fn transition(job: &mut Job, next: JobStatus) -> Result<()> {
    if !job.status.can_transition_to(&next) {
        return Err(invalid_status(job, "transition"));
    }
    debug!(job_id = %job.id, from = ?job.status, to = ?next, "Job status changed");
    job.status = next;
    Ok(())
}

fn slash_event(receipt: &SlashReceipt) -> ProtocolEvent {
    ProtocolEvent::StakeSlashed {
        participant: receipt.participant,
        role: receipt.role,
        amount: receipt.amount,
        beneficiary: receipt.beneficiary,
        beneficiary_share: receipt.shares.beneficiary,
        treasury_share: receipt.shares.treasury,
        burned: receipt.shares.burn,
    }
}
