use crate::{
    canonical::compute_round_seed, BeaconError, BeaconState, RandomnessBeacon, Result, SeedCommit,
    SeedReveal,
};
use agora_types::{Clock, Hash, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Commit-reveal beacon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Seconds after the first commit before reveals open (and the seed can exist)
    pub reveal_delay_secs: u64,

    /// Seconds reveals are accepted once open
    pub reveal_window_secs: u64,

    /// Previous seed used for the first round
    pub genesis_seed: Hash,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            reveal_delay_secs: 60,
            reveal_window_secs: 300,
            genesis_seed: [0u8; 32],
        }
    }
}

impl BeaconConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reveal_window_secs == 0 {
            return Err(BeaconError::InvalidConfiguration(
                "reveal_window_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Beacon whose seed is mixed from contributor secrets. A round's seed only
/// exists once its reveal delay has passed, so nobody can know it while
/// commitments are still being accepted.
pub struct CommitRevealBeacon {
    config: BeaconConfig,
    clock: Arc<dyn Clock>,

    /// Beacon state per round
    states: Arc<RwLock<HashMap<u64, BeaconState>>>,

    /// Most recently finalized seed, chained into the next round
    last_seed: Arc<RwLock<Hash>>,

    // Metrics
    pub beacon_commits_total: Option<Arc<prometheus::IntCounter>>,
    pub beacon_reveals_total: Option<Arc<prometheus::IntCounter>>,
    pub beacon_finalizations_total: Option<Arc<prometheus::IntCounter>>,
}

impl CommitRevealBeacon {
    pub fn new(config: BeaconConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let genesis = config.genesis_seed;
        Ok(Self {
            config,
            clock,
            states: Arc::new(RwLock::new(HashMap::new())),
            last_seed: Arc::new(RwLock::new(genesis)),
            beacon_commits_total: None,
            beacon_reveals_total: None,
            beacon_finalizations_total: None,
        })
    }

    /// Set metrics for beacon tracking
    pub fn set_metrics(
        &mut self,
        beacon_commits_total: Arc<prometheus::IntCounter>,
        beacon_reveals_total: Arc<prometheus::IntCounter>,
        beacon_finalizations_total: Arc<prometheus::IntCounter>,
    ) {
        self.beacon_commits_total = Some(beacon_commits_total);
        self.beacon_reveals_total = Some(beacon_reveals_total);
        self.beacon_finalizations_total = Some(beacon_finalizations_total);
    }

    fn reveal_opens_at(&self, state: &BeaconState) -> Timestamp {
        state.opened_at.saturating_add(self.config.reveal_delay_secs)
    }

    fn reveal_closes_at(&self, state: &BeaconState) -> Timestamp {
        self.reveal_opens_at(state)
            .saturating_add(self.config.reveal_window_secs)
    }

    /// Accept a commitment. The first commit for a round opens it.
    pub async fn submit_commit(&self, commit: SeedCommit) -> Result<()> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        let state = states
            .entry(commit.round_id)
            .or_insert_with(|| BeaconState::new(commit.round_id, now));

        if state.is_finalized() || now >= self.reveal_opens_at(state) {
            return Err(BeaconError::CommitPhaseClosed(commit.round_id));
        }
        if state
            .commits
            .iter()
            .any(|c| c.contributor == commit.contributor)
        {
            return Err(BeaconError::DuplicateCommit(
                commit.contributor.short(),
                commit.round_id,
            ));
        }

        state.commits.push(commit.clone());
        if let Some(ref counter) = self.beacon_commits_total {
            counter.inc();
        }

        info!(
            round_id = commit.round_id,
            contributor = %commit.contributor.short(),
            commitment = hex::encode(&commit.commitment[..8]),
            total_commits = state.commits.len(),
            "🎲 Beacon commit submitted"
        );
        Ok(())
    }

    /// Open a commitment during the round's reveal window
    pub async fn submit_reveal(&self, reveal: SeedReveal) -> Result<()> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        let state = states
            .get_mut(&reveal.round_id)
            .ok_or(BeaconError::UnknownRound(reveal.round_id))?;

        let opens_at = self.reveal_opens_at(state);
        if now < opens_at {
            return Err(BeaconError::SeedNotAvailable {
                round_id: reveal.round_id,
                available_at: opens_at,
            });
        }
        if state.is_finalized() || now >= self.reveal_closes_at(state) {
            return Err(BeaconError::RevealWindowClosed(reveal.round_id));
        }

        let commit = state
            .commits
            .iter()
            .find(|c| c.contributor == reveal.contributor)
            .ok_or_else(|| {
                BeaconError::CommitNotFound(reveal.contributor.short(), reveal.round_id)
            })?;
        if !commit.verify(&reveal.secret) {
            let expected = hex::encode(commit.commitment);
            let actual = hex::encode(crate::commitment_for(
                reveal.round_id,
                &reveal.contributor,
                &reveal.secret,
            ));
            return Err(BeaconError::CommitmentMismatch { expected, actual });
        }
        if state
            .reveals
            .iter()
            .any(|r| r.contributor == reveal.contributor)
        {
            return Ok(());
        }

        state.reveals.push(reveal.clone());
        if let Some(ref counter) = self.beacon_reveals_total {
            counter.inc();
        }

        info!(
            round_id = reveal.round_id,
            contributor = %reveal.contributor.short(),
            total_reveals = state.reveals.len(),
            "🔓 Beacon secret revealed"
        );
        Ok(())
    }

    /// Fix the round's seed from the reveals received so far. Idempotent.
    pub async fn finalize_round(&self, round_id: u64) -> Result<Hash> {
        let now = self.clock.now();
        let mut states = self.states.write().await;
        let state = states
            .get_mut(&round_id)
            .ok_or(BeaconError::UnknownRound(round_id))?;

        if let Some(seed) = state.seed {
            return Ok(seed);
        }
        let opens_at = self.reveal_opens_at(state);
        if now < opens_at {
            return Err(BeaconError::SeedNotAvailable {
                round_id,
                available_at: opens_at,
            });
        }
        if state.reveals.is_empty() {
            return Err(BeaconError::NoReveals(round_id));
        }

        let mut last_seed = self.last_seed.write().await;
        let seed = compute_round_seed(round_id, &last_seed, &state.reveals);
        state.seed = Some(seed);
        *last_seed = seed;

        if let Some(ref counter) = self.beacon_finalizations_total {
            counter.inc();
        }

        info!(
            round_id,
            contributors = state.reveals.len(),
            commits = state.commits.len(),
            seed = hex::encode(&seed[..8]),
            "✨ Beacon seed finalized"
        );
        Ok(seed)
    }

    pub async fn get_state(&self, round_id: u64) -> Option<BeaconState> {
        self.states.read().await.get(&round_id).cloned()
    }
}

#[async_trait]
impl RandomnessBeacon for CommitRevealBeacon {
    async fn seed_for(&self, round_id: u64) -> Result<Hash> {
        debug!(round_id, "Beacon seed requested");
        self.finalize_round(round_id).await
    }
}
