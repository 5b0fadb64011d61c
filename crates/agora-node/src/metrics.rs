use agora_jobs::ProtocolCounters;
use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus registry for one protocol instance
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    counters: ProtocolCounters,

    // Commit-reveal beacon
    pub beacon_commits_total: Arc<IntCounter>,
    pub beacon_reveals_total: Arc<IntCounter>,
    pub beacon_finalizations_total: Arc<IntCounter>,

    // Replay
    pub scenario_steps_total: IntCounter,
    pub scenario_step_failures_total: IntCounter,
    pub events_recorded: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<Arc<IntCounter>> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(Arc::new(counter))
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let counters = ProtocolCounters {
            stake_locks_total: counter(
                &registry,
                "agora_stake_locks_total",
                "Stake locks taken for agents and validators",
            )?,
            slashes_total: counter(&registry, "agora_slashes_total", "Slashes applied")?,
            slashed_amount_total: counter(
                &registry,
                "agora_slashed_amount_total",
                "Base units slashed across all roles",
            )?,
            rounds_opened_total: counter(
                &registry,
                "agora_rounds_opened_total",
                "Validation rounds opened",
            )?,
            votes_committed_total: counter(
                &registry,
                "agora_votes_committed_total",
                "Vote commitments accepted",
            )?,
            votes_revealed_total: counter(
                &registry,
                "agora_votes_revealed_total",
                "Vote reveals accepted",
            )?,
            quorum_failures_total: counter(
                &registry,
                "agora_quorum_failures_total",
                "Rounds tallied without a quorum",
            )?,
            jobs_created_total: counter(&registry, "agora_jobs_created_total", "Jobs created")?,
            jobs_finalized_total: counter(
                &registry,
                "agora_jobs_finalized_total",
                "Jobs finalized",
            )?,
            disputes_raised_total: counter(
                &registry,
                "agora_disputes_raised_total",
                "Disputes raised",
            )?,
            force_finalizations_total: counter(
                &registry,
                "agora_force_finalizations_total",
                "Jobs finalized by the owner",
            )?,
        };

        let beacon_commits_total = counter(
            &registry,
            "agora_beacon_commits_total",
            "Beacon secret commitments accepted",
        )?;
        let beacon_reveals_total = counter(
            &registry,
            "agora_beacon_reveals_total",
            "Beacon secrets revealed",
        )?;
        let beacon_finalizations_total = counter(
            &registry,
            "agora_beacon_finalizations_total",
            "Beacon seeds fixed",
        )?;

        let scenario_steps_total =
            IntCounter::new("agora_scenario_steps_total", "Scenario steps replayed")?;
        let scenario_step_failures_total = IntCounter::new(
            "agora_scenario_step_failures_total",
            "Scenario steps that returned an error",
        )?;
        let events_recorded =
            IntGauge::new("agora_events_recorded", "Records in the protocol event log")?;
        registry.register(Box::new(scenario_steps_total.clone()))?;
        registry.register(Box::new(scenario_step_failures_total.clone()))?;
        registry.register(Box::new(events_recorded.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            counters,
            beacon_commits_total,
            beacon_reveals_total,
            beacon_finalizations_total,
            scenario_steps_total,
            scenario_step_failures_total,
            events_recorded,
        })
    }

    pub fn counters(&self) -> &ProtocolCounters {
        &self.counters
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}
