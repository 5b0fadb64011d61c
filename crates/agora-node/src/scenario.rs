//! Scenario replay
//!
//! A scenario is a JSON list of protocol actions replayed against an in-memory
//! protocol instance driven by a manual clock. Participants are named by
//! label; `owner` and `moderator` resolve to the configured role addresses.
//! Every event the protocol records is written out as one JSON line.
//!
//! With the commit-reveal beacon, a job's committee can only be drawn once
//! contributors have committed and revealed secrets for its round
//! (`beacon_commit` / `beacon_reveal`, keyed by job id).

use agora_consensus::{compute_commitment, ConsensusParams, Vote};
use agora_jobs::{NewJob, Protocol, ProtocolCounters, ProtocolSettings};
use agora_types::{
    hash_parts, Address, Amount, BasisPoints, Clock, Hash, JobId, ManualClock, Role,
};
use agora_vrf::{CommitRevealBeacon, DeterministicBeacon, RandomnessBeacon, SeedCommit, SeedReveal};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config_loader::{BeaconKind, BeaconSection};
use crate::metrics::Metrics;

const DEFAULT_START: u64 = 1_700_000_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Clock value before the first step
    #[serde(default = "default_start")]
    pub start: u64,
    pub steps: Vec<ScenarioStep>,
}

fn default_start() -> u64 {
    DEFAULT_START
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioStep {
    #[serde(flatten)]
    pub action: Action,
    /// The step must fail with an error whose message contains this text
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Fund {
        who: String,
        amount: u64,
    },
    Allow {
        who: String,
        role: Role,
    },
    SetReputation {
        who: String,
        score: i64,
    },
    DepositStake {
        who: String,
        role: Role,
        amount: u64,
    },
    WithdrawStake {
        who: String,
        role: Role,
        amount: u64,
    },
    RegisterValidator {
        who: String,
    },
    /// Commit a secret to the beacon round of a job
    BeaconCommit {
        job: u64,
        who: String,
        secret: String,
    },
    BeaconReveal {
        job: u64,
        who: String,
    },
    CreateJob {
        employer: String,
        reward: u64,
        /// Seconds from now
        deadline_in: u64,
        content: String,
        #[serde(default)]
        agent_stake: Option<u64>,
        #[serde(default)]
        fee_bps: Option<u16>,
        #[serde(default)]
        agent_share_bps: Option<u16>,
    },
    Apply {
        job: u64,
        agent: String,
    },
    Submit {
        job: u64,
        agent: String,
        result: String,
    },
    Commit {
        job: u64,
        validator: String,
        vote: Vote,
        salt: String,
    },
    /// Reveals what was committed unless `vote` overrides it
    Reveal {
        job: u64,
        validator: String,
        #[serde(default)]
        vote: Option<Vote>,
    },
    Advance {
        secs: u64,
    },
    Tally {
        job: u64,
    },
    Finalize {
        job: u64,
    },
    ForceFinalize {
        job: u64,
        #[serde(default = "owner_label")]
        caller: String,
    },
    Dispute {
        job: u64,
        caller: String,
        evidence: String,
    },
    Resolve {
        job: u64,
        employer_wins: bool,
        #[serde(default = "moderator_label")]
        caller: String,
    },
    Cancel {
        job: u64,
        caller: String,
    },
    Expire {
        job: u64,
    },
    UpdateParams {
        params: ConsensusParams,
        #[serde(default = "owner_label")]
        caller: String,
    },
}

fn owner_label() -> String {
    "owner".to_string()
}

fn moderator_label() -> String {
    "moderator".to_string()
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Fund { .. } => "fund",
            Action::Allow { .. } => "allow",
            Action::SetReputation { .. } => "set_reputation",
            Action::DepositStake { .. } => "deposit_stake",
            Action::WithdrawStake { .. } => "withdraw_stake",
            Action::RegisterValidator { .. } => "register_validator",
            Action::BeaconCommit { .. } => "beacon_commit",
            Action::BeaconReveal { .. } => "beacon_reveal",
            Action::CreateJob { .. } => "create_job",
            Action::Apply { .. } => "apply",
            Action::Submit { .. } => "submit",
            Action::Commit { .. } => "commit",
            Action::Reveal { .. } => "reveal",
            Action::Advance { .. } => "advance",
            Action::Tally { .. } => "tally",
            Action::Finalize { .. } => "finalize",
            Action::ForceFinalize { .. } => "force_finalize",
            Action::Dispute { .. } => "dispute",
            Action::Resolve { .. } => "resolve",
            Action::Cancel { .. } => "cancel",
            Action::Expire { .. } => "expire",
            Action::UpdateParams { .. } => "update_params",
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse scenario: {}", path.display()))
    }
}

/// Outcome of one replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    pub failures: usize,
    pub events: usize,
    pub issued: Amount,
    pub accounted: Amount,
    pub escrowed: Amount,
    /// Wall-clock time the replay finished; the protocol itself runs on the
    /// scenario clock
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl ReplaySummary {
    pub fn conserved(&self) -> bool {
        self.issued == self.accounted
    }
}

/// Line written for a step that failed
#[derive(Debug, Serialize)]
struct StepFailure<'a> {
    step: usize,
    action: &'a str,
    error: String,
}

pub struct ScenarioRunner {
    protocol: Protocol,
    clock: Arc<ManualClock>,
    /// Set when seeds come from contributor secrets
    seed_beacon: Option<Arc<CommitRevealBeacon>>,
    commits: HashMap<(JobId, Address), (Vote, [u8; 32])>,
    secrets: HashMap<(u64, Address), [u8; 32]>,
    metrics: Option<Metrics>,
    cursor: u64,
}

impl ScenarioRunner {
    pub fn new(
        settings: ProtocolSettings,
        beacon: &BeaconSection,
        start: u64,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let seed_beacon = match beacon.kind {
            BeaconKind::Deterministic => None,
            BeaconKind::CommitReveal => {
                let mut service =
                    CommitRevealBeacon::new(beacon.commit_reveal.clone(), clock.clone())
                        .context("Failed to start commit-reveal beacon")?;
                if let Some(m) = &metrics {
                    service.set_metrics(
                        m.beacon_commits_total.clone(),
                        m.beacon_reveals_total.clone(),
                        m.beacon_finalizations_total.clone(),
                    );
                }
                Some(Arc::new(service))
            }
        };
        let randomness: Arc<dyn RandomnessBeacon> = match &seed_beacon {
            Some(service) => service.clone(),
            None => Arc::new(DeterministicBeacon::from_label(&beacon.label)),
        };
        info!(kind = ?beacon.kind, "🎲 Randomness beacon ready");

        let counters: Option<&ProtocolCounters> = metrics.as_ref().map(|m| m.counters());
        let protocol = Protocol::assemble(settings, clock.clone(), randomness, counters)
            .context("Failed to assemble protocol")?;
        Ok(Self {
            protocol,
            clock,
            seed_beacon,
            commits: HashMap::new(),
            secrets: HashMap::new(),
            metrics,
            cursor: 0,
        })
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn clock(&self) -> &Arc<ManualClock> {
        &self.clock
    }

    pub fn seed_beacon(&self) -> Option<&Arc<CommitRevealBeacon>> {
        self.seed_beacon.as_ref()
    }

    fn require_seed_beacon(&self) -> Result<Arc<CommitRevealBeacon>> {
        self.seed_beacon
            .clone()
            .context("beacon actions need beacon.kind = \"commit_reveal\"")
    }

    /// Resolve a participant label to an address
    pub fn address(&self, who: &str) -> Address {
        match who {
            "owner" => self.protocol.settings.jobs.owner,
            "moderator" => self.protocol.settings.disputes.moderator,
            "treasury" => self.protocol.settings.ledger.treasury,
            other => other
                .parse::<Address>()
                .unwrap_or_else(|_| Address::from_label(other)),
        }
    }

    pub async fn replay(
        &mut self,
        scenario: &Scenario,
        keep_going: bool,
        out: &mut impl Write,
    ) -> Result<ReplaySummary> {
        let start = std::time::Instant::now();
        info!(
            name = %scenario.name,
            steps = scenario.steps.len(),
            keep_going,
            "▶️ Replaying scenario"
        );

        let mut failures = 0;
        for (index, step) in scenario.steps.iter().enumerate() {
            if let Some(m) = &self.metrics {
                m.scenario_steps_total.inc();
            }
            let result = self.apply(&step.action).await;
            self.flush_events(out).await?;

            let failure = match (result, &step.expect_error) {
                (Ok(()), None) => None,
                (Err(e), Some(expected)) if format!("{:#}", e).contains(expected.as_str()) => {
                    debug!(step = index, action = step.action.name(), error = %e, "Expected failure");
                    None
                }
                (Err(e), _) => Some(format!("{:#}", e)),
                (Ok(()), Some(expected)) => {
                    Some(format!("expected an error containing '{}'", expected))
                }
            };

            if let Some(error) = failure {
                failures += 1;
                if let Some(m) = &self.metrics {
                    m.scenario_step_failures_total.inc();
                }
                warn!(step = index, action = step.action.name(), error = %error, "❌ Step failed");
                let line = StepFailure {
                    step: index,
                    action: step.action.name(),
                    error: error.clone(),
                };
                writeln!(out, "{}", serde_json::to_string(&line)?)?;
                if !keep_going {
                    anyhow::bail!("step {} ({}) failed: {}", index, step.action.name(), error);
                }
            }
        }

        let summary = self.summary(scenario.steps.len(), failures).await?;
        info!(
            steps = summary.steps,
            failures = summary.failures,
            events = summary.events,
            conserved = summary.conserved(),
            duration_ms = start.elapsed().as_millis() as u64,
            "🏁 Scenario complete"
        );
        Ok(summary)
    }

    async fn summary(&self, steps: usize, failures: usize) -> Result<ReplaySummary> {
        let economics = &self.protocol.economics;
        Ok(ReplaySummary {
            steps,
            failures,
            events: self.protocol.jobs.events().len().await,
            issued: economics.balances.totals().await.issued,
            accounted: self.protocol.accounted_supply().await?,
            escrowed: economics.escrow.total_escrowed().await,
            finished_at: chrono::Utc::now(),
        })
    }

    async fn flush_events(&mut self, out: &mut impl Write) -> Result<()> {
        let (records, next) = self
            .protocol
            .jobs
            .events()
            .read_from(self.cursor, usize::MAX)
            .await;
        for record in &records {
            writeln!(out, "{}", serde_json::to_string(record)?)?;
        }
        self.cursor = next;
        if let Some(m) = &self.metrics {
            m.events_recorded.set(next as i64);
        }
        Ok(())
    }

    pub async fn apply(&mut self, action: &Action) -> Result<()> {
        let jobs = self.protocol.jobs.clone();
        match action {
            Action::Fund { who, amount } => {
                self.protocol
                    .economics
                    .balances
                    .mint(self.address(who), Amount::new(*amount))
                    .await?;
            }
            Action::Allow { who, role } => {
                self.protocol.identity.allow(self.address(who), *role).await;
            }
            Action::SetReputation { who, score } => {
                self.protocol
                    .reputation
                    .set_reputation(&self.address(who), *score)
                    .await;
            }
            Action::DepositStake { who, role, amount } => {
                jobs.deposit_stake(self.address(who), *role, Amount::new(*amount))
                    .await?;
            }
            Action::WithdrawStake { who, role, amount } => {
                jobs.withdraw_stake(self.address(who), *role, Amount::new(*amount))
                    .await?;
            }
            Action::RegisterValidator { who } => {
                jobs.register_validator(self.address(who), &[]).await?;
            }
            Action::BeaconCommit { job, who, secret } => {
                let beacon = self.require_seed_beacon()?;
                let contributor = self.address(who);
                let secret = content_hash(secret);
                beacon
                    .submit_commit(SeedCommit::new(*job, contributor, &secret))
                    .await?;
                self.secrets.insert((*job, contributor), secret);
            }
            Action::BeaconReveal { job, who } => {
                let beacon = self.require_seed_beacon()?;
                let contributor = self.address(who);
                let secret = self
                    .secrets
                    .get(&(*job, contributor))
                    .copied()
                    .with_context(|| {
                        format!(
                            "no beacon secret recorded for {} on round {}",
                            contributor.short(),
                            job
                        )
                    })?;
                beacon
                    .submit_reveal(SeedReveal {
                        round_id: *job,
                        contributor,
                        secret,
                    })
                    .await?;
            }
            Action::CreateJob {
                employer,
                reward,
                deadline_in,
                content,
                agent_stake,
                fee_bps,
                agent_share_bps,
            } => {
                let deadline = self.clock.now().saturating_add(*deadline_in);
                let mut request = NewJob::new(
                    self.address(employer),
                    Amount::new(*reward),
                    deadline,
                    content_hash(content),
                );
                if let Some(stake) = agent_stake {
                    request = request.with_agent_stake(Amount::new(*stake));
                }
                if let Some(bps) = fee_bps {
                    request = request.with_fee(BasisPoints::new(*bps)?);
                }
                if let Some(bps) = agent_share_bps {
                    request = request.with_agent_share(BasisPoints::new(*bps)?);
                }
                jobs.create_job(request).await?;
            }
            Action::Apply { job, agent } => {
                jobs.apply_for_job(JobId::new(*job), self.address(agent), &[])
                    .await?;
            }
            Action::Submit { job, agent, result } => {
                jobs.submit_result(JobId::new(*job), self.address(agent), content_hash(result))
                    .await?;
            }
            Action::Commit {
                job,
                validator,
                vote,
                salt,
            } => {
                let job_id = JobId::new(*job);
                let validator = self.address(validator);
                let salt = content_hash(salt);
                let commitment = compute_commitment(*vote, &salt, &validator, job_id);
                jobs.commit_vote(job_id, validator, commitment).await?;
                self.commits.insert((job_id, validator), (*vote, salt));
            }
            Action::Reveal {
                job,
                validator,
                vote,
            } => {
                let job_id = JobId::new(*job);
                let validator = self.address(validator);
                let (committed, salt) = self
                    .commits
                    .get(&(job_id, validator))
                    .copied()
                    .with_context(|| {
                        format!("no commit recorded for {} on {}", validator.short(), job_id)
                    })?;
                jobs.reveal_vote(job_id, validator, vote.unwrap_or(committed), salt)
                    .await?;
            }
            Action::Advance { secs } => {
                let now = self.clock.advance(*secs);
                debug!(now, secs, "⏩ Clock advanced");
            }
            Action::Tally { job } => {
                jobs.tally_round(JobId::new(*job)).await?;
            }
            Action::Finalize { job } => {
                jobs.finalize_job(JobId::new(*job)).await?;
            }
            Action::ForceFinalize { job, caller } => {
                jobs.force_finalize(JobId::new(*job), self.address(caller))
                    .await?;
            }
            Action::Dispute {
                job,
                caller,
                evidence,
            } => {
                jobs.raise_dispute(JobId::new(*job), self.address(caller), content_hash(evidence))
                    .await?;
            }
            Action::Resolve {
                job,
                employer_wins,
                caller,
            } => {
                jobs.resolve_dispute(JobId::new(*job), self.address(caller), *employer_wins)
                    .await?;
            }
            Action::Cancel { job, caller } => {
                jobs.cancel_job(JobId::new(*job), self.address(caller))
                    .await?;
            }
            Action::Expire { job } => {
                jobs.expire_job(JobId::new(*job)).await?;
            }
            Action::UpdateParams { params, caller } => {
                jobs.update_params(self.address(caller), params.clone())
                    .await?;
            }
        }
        Ok(())
    }
}

/// Content, result, evidence and salt strings enter the protocol as hashes
pub fn content_hash(text: &str) -> Hash {
    hash_parts(&[text.as_bytes()])
}
