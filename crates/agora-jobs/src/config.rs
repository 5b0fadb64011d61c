use crate::{JobError, Result};
use agora_types::{Address, Amount, BasisPoints};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the owner's escape hatch does to a stuck job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceFinalizePolicy {
    /// Settle as a failure: employer refunded, agent slashed
    #[default]
    FavorEmployer,
    /// No outcome: employer refunded, agent stake returned, no reputation change
    Refund,
}

impl fmt::Display for ForceFinalizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceFinalizePolicy::FavorEmployer => write!(f, "favor_employer"),
            ForceFinalizePolicy::Refund => write!(f, "refund"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Owner of the protocol; may force finalize and update parameters
    pub owner: Address,
    pub default_fee_bps: BasisPoints,
    /// Agent's share of the reward net of fees; the rest funds validators.
    /// Defaults to the whole net reward, so a validator pool is opt-in per job.
    pub default_agent_share_bps: BasisPoints,
    pub force_finalize_policy: ForceFinalizePolicy,
    pub agent_reputation_reward: i64,
    pub agent_reputation_penalty: i64,
    /// Applied when an assigned agent lets the job expire without submitting
    pub abandonment_penalty: i64,
    pub validator_reputation_reward: i64,
    pub validator_reputation_penalty: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            owner: Address::from_label("agora-owner"),
            default_fee_bps: BasisPoints::new_const(250),
            default_agent_share_bps: BasisPoints::FULL,
            force_finalize_policy: ForceFinalizePolicy::FavorEmployer,
            agent_reputation_reward: 10,
            agent_reputation_penalty: 10,
            abandonment_penalty: 5,
            validator_reputation_reward: 1,
            validator_reputation_penalty: 2,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_reputation_penalty < 0
            || self.abandonment_penalty < 0
            || self.validator_reputation_penalty < 0
        {
            return Err(JobError::InvalidParameters(
                "reputation penalties are magnitudes and must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeConfig {
    /// Seconds after submission (or after the tally) during which a dispute may
    /// be raised. Zero settles tallies immediately.
    pub window_secs: u64,
    pub appeal_bond: Amount,
    /// Sole authority allowed to resolve disputes
    pub moderator: Address,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            window_secs: 86_400,
            appeal_bond: Amount::new(10),
            moderator: Address::from_label("agora-moderator"),
        }
    }
}
