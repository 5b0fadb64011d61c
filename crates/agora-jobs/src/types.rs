use agora_consensus::RoundOutcome;
use agora_economics::LockId;
use agora_types::{Address, Amount, BasisPoints, Hash, JobId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Reward escrowed, waiting for an agent
    Created,
    /// Agent assigned and staked
    Applied,
    /// Result in, validation round open
    Submitted,
    /// At least one vote revealed, or an outcome awaiting its dispute window
    Validating,
    /// Outcome suspended until the moderator decides
    Disputed,
    Finalized,
    Cancelled,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Cancelled | Self::Expired)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Applied) => true,
            (Created, Cancelled) => true,
            (Created, Expired) => true,

            (Applied, Submitted) => true,
            (Applied, Expired) => true,

            (Submitted, Validating) => true,
            (Submitted, Disputed) => true,
            (Submitted, Finalized) => true, // zero-window settlement or force finalize
            (Submitted, Expired) => true,

            (Validating, Disputed) => true,
            (Validating, Finalized) => true,
            (Validating, Expired) => true,

            (Disputed, Finalized) => true,

            _ => false,
        }
    }
}

/// Tallied outcome waiting for its dispute window to close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOutcome {
    pub success: bool,
    pub tallied_at: Timestamp,
    pub dispute_deadline: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub employer: Address,
    pub agent: Option<Address>,
    pub reward: Amount,
    pub required_agent_stake: Amount,
    pub fee_bps: BasisPoints,
    pub agent_share_bps: BasisPoints,
    pub status: JobStatus,
    /// Set once the job is finalized with a decided outcome
    pub success: Option<bool>,
    pub deadline: Timestamp,
    pub created_at: Timestamp,
    pub assigned_at: Option<Timestamp>,
    pub submitted_at: Option<Timestamp>,
    pub finalized_at: Option<Timestamp>,
    pub content_hash: Hash,
    pub result_hash: Option<Hash>,
    /// Proof that a fee-burn obligation was honoured off-protocol
    pub burn_receipt: Option<Hash>,
    pub escrow_lock: LockId,
    pub round_outcome: Option<RoundOutcome>,
    pub pending: Option<PendingOutcome>,
    pub certificate_id: Option<u64>,
}

impl Job {
    pub fn is_party(&self, address: &Address) -> bool {
        self.employer == *address || self.agent.as_ref() == Some(address)
    }
}

/// Parameters for [`crate::JobManager::create_job`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub employer: Address,
    pub reward: Amount,
    pub deadline: Timestamp,
    pub content_hash: Hash,
    /// Defaults to the agent role's minimum stake
    #[serde(default)]
    pub required_agent_stake: Option<Amount>,
    #[serde(default)]
    pub fee_bps: Option<BasisPoints>,
    #[serde(default)]
    pub agent_share_bps: Option<BasisPoints>,
    #[serde(default)]
    pub burn_receipt: Option<Hash>,
}

impl NewJob {
    pub fn new(employer: Address, reward: Amount, deadline: Timestamp, content_hash: Hash) -> Self {
        Self {
            employer,
            reward,
            deadline,
            content_hash,
            required_agent_stake: None,
            fee_bps: None,
            agent_share_bps: None,
            burn_receipt: None,
        }
    }

    pub fn with_agent_stake(mut self, stake: Amount) -> Self {
        self.required_agent_stake = Some(stake);
        self
    }

    pub fn with_fee(mut self, fee_bps: BasisPoints) -> Self {
        self.fee_bps = Some(fee_bps);
        self
    }

    pub fn with_agent_share(mut self, agent_share_bps: BasisPoints) -> Self {
        self.agent_share_bps = Some(agent_share_bps);
        self
    }
}
