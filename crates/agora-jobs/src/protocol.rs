//! Wiring for a self-contained protocol instance backed by the in-memory
//! collaborators. Used by the node's scenario replay and by tests.

use crate::{
    AllowlistOracle, Collaborators, DisputeConfig, InMemoryCertificates, InMemoryFeePool,
    InMemoryReputation, JobConfig, JobManager, Result,
};
use agora_consensus::{ConsensusParams, ParamsRegistry, ValidationEngine};
use agora_economics::{BalanceManager, EconomicsEngine, LedgerConfig, LedgerError, StakeLedger};
use agora_types::{Amount, Clock};
use agora_vrf::RandomnessBeacon;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    pub ledger: LedgerConfig,
    pub consensus: ConsensusParams,
    pub jobs: JobConfig,
    pub disputes: DisputeConfig,
    /// Reputation at or below this is blacklisted
    pub blacklist_threshold: i64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            consensus: ConsensusParams::default(),
            jobs: JobConfig::default(),
            disputes: DisputeConfig::default(),
            blacklist_threshold: -50,
        }
    }
}

/// Counters handed to each component's `set_metrics`
#[derive(Clone)]
pub struct ProtocolCounters {
    pub stake_locks_total: Arc<prometheus::IntCounter>,
    pub slashes_total: Arc<prometheus::IntCounter>,
    pub slashed_amount_total: Arc<prometheus::IntCounter>,
    pub rounds_opened_total: Arc<prometheus::IntCounter>,
    pub votes_committed_total: Arc<prometheus::IntCounter>,
    pub votes_revealed_total: Arc<prometheus::IntCounter>,
    pub quorum_failures_total: Arc<prometheus::IntCounter>,
    pub jobs_created_total: Arc<prometheus::IntCounter>,
    pub jobs_finalized_total: Arc<prometheus::IntCounter>,
    pub disputes_raised_total: Arc<prometheus::IntCounter>,
    pub force_finalizations_total: Arc<prometheus::IntCounter>,
}

pub struct Protocol {
    pub settings: ProtocolSettings,
    pub clock: Arc<dyn Clock>,
    pub economics: EconomicsEngine,
    pub engine: Arc<ValidationEngine>,
    pub jobs: Arc<JobManager>,
    pub identity: Arc<AllowlistOracle>,
    pub reputation: Arc<InMemoryReputation>,
    pub certificates: Arc<InMemoryCertificates>,
    pub fee_pool: Arc<InMemoryFeePool>,
}

impl Protocol {
    pub fn in_memory(
        settings: ProtocolSettings,
        clock: Arc<dyn Clock>,
        beacon: Arc<dyn RandomnessBeacon>,
    ) -> Result<Self> {
        Self::assemble(settings, clock, beacon, None)
    }

    pub fn assemble(
        settings: ProtocolSettings,
        clock: Arc<dyn Clock>,
        beacon: Arc<dyn RandomnessBeacon>,
        counters: Option<&ProtocolCounters>,
    ) -> Result<Self> {
        let balances = Arc::new(BalanceManager::new());
        let mut stakes = StakeLedger::new(settings.ledger.clone(), balances)?;
        if let Some(c) = counters {
            stakes.set_metrics(
                c.stake_locks_total.clone(),
                c.slashes_total.clone(),
                c.slashed_amount_total.clone(),
            );
        }
        let economics = EconomicsEngine::with_stake_ledger(stakes);

        let registry = Arc::new(ParamsRegistry::new(
            settings.jobs.owner,
            settings.consensus.clone(),
        )?);
        let mut engine =
            ValidationEngine::new(registry, economics.stakes.clone(), beacon, clock.clone());
        if let Some(c) = counters {
            engine.set_metrics(
                c.rounds_opened_total.clone(),
                c.votes_committed_total.clone(),
                c.votes_revealed_total.clone(),
                c.quorum_failures_total.clone(),
            );
        }
        let engine = Arc::new(engine);

        let identity = Arc::new(AllowlistOracle::new());
        let reputation = Arc::new(InMemoryReputation::new(settings.blacklist_threshold));
        let certificates = Arc::new(InMemoryCertificates::new());
        let fee_pool = Arc::new(InMemoryFeePool::new());
        let collaborators = Collaborators {
            identity: identity.clone(),
            reputation: reputation.clone(),
            certificates: certificates.clone(),
            fee_pool: fee_pool.clone(),
        };

        let mut jobs = JobManager::new(
            settings.jobs.clone(),
            settings.disputes.clone(),
            economics.escrow.clone(),
            economics.stakes.clone(),
            engine.clone(),
            collaborators,
            clock.clone(),
        )?;
        if let Some(c) = counters {
            jobs.set_metrics(
                c.jobs_created_total.clone(),
                c.jobs_finalized_total.clone(),
                c.disputes_raised_total.clone(),
                c.force_finalizations_total.clone(),
            );
        }

        info!(
            owner = %settings.jobs.owner.short(),
            moderator = %settings.disputes.moderator.short(),
            treasury = %settings.ledger.treasury.short(),
            dispute_window_secs = settings.disputes.window_secs,
            "🚀 Protocol assembled"
        );
        Ok(Self {
            settings,
            clock,
            economics,
            engine,
            jobs: Arc::new(jobs),
            identity,
            reputation,
            certificates,
            fee_pool,
        })
    }

    /// Everything ever minted, accounted for: ledger balances and stakes plus
    /// fees handed to the pool plus burned slashes. Equals the issued total.
    pub async fn accounted_supply(&self) -> Result<Amount> {
        let internal = self.economics.internal_supply().await?;
        let totals = self.economics.balances.totals().await;
        let accounted = internal
            .checked_add(totals.exported)
            .and_then(|a| a.checked_add(totals.burned))
            .ok_or_else(|| LedgerError::Overflow("accounted supply".to_string()))?;
        Ok(accounted)
    }
}
