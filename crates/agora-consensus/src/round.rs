use crate::{ConsensusParams, Vote};
use agora_economics::SlashReceipt;
use agora_types::{Address, Amount, BasisPoints, Hash, JobId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Commit,
    Reveal,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Accepting commits or reveals
    Open,
    /// Outcome fixed, validator stakes still locked
    Tallied,
    /// Validator stakes released or slashed
    Settled,
    /// Authority withdrawn (dispute or expiry); stakes released, votes kept
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Pending,
    Approved,
    Rejected,
    QuorumNotReached,
}

impl RoundOutcome {
    /// `Some(true)` for approved, `Some(false)` for rejected
    pub fn as_success(&self) -> Option<bool> {
        match self {
            RoundOutcome::Approved => Some(true),
            RoundOutcome::Rejected => Some(false),
            RoundOutcome::Pending | RoundOutcome::QuorumNotReached => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedVote {
    pub vote: Vote,
    pub revealed_at: Timestamp,
}

/// Commit-reveal state for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRound {
    pub job_id: JobId,
    pub employer: Address,
    pub params_version: u32,
    pub params: ConsensusParams,
    /// In selection order
    pub committee: Vec<Address>,
    pub stake_per_validator: Amount,
    pub slash_bps: BasisPoints,
    pub non_reveal_penalty_bps: BasisPoints,
    pub seed: Hash,
    pub opened_at: Timestamp,
    pub commit_deadline: Timestamp,
    pub reveal_deadline: Timestamp,
    pub commitments: BTreeMap<Address, Hash>,
    pub reveals: BTreeMap<Address, RevealedVote>,
    pub approvals: u64,
    pub rejections: u64,
    pub status: RoundStatus,
    pub outcome: RoundOutcome,
    pub tallied_at: Option<Timestamp>,
}

impl ValidationRound {
    pub fn phase_at(&self, now: Timestamp) -> RoundPhase {
        if now < self.commit_deadline {
            RoundPhase::Commit
        } else if now < self.reveal_deadline {
            RoundPhase::Reveal
        } else {
            RoundPhase::Closed
        }
    }

    pub fn is_member(&self, validator: &Address) -> bool {
        self.committee.contains(validator)
    }

    pub fn all_revealed(&self) -> bool {
        self.reveals.len() == self.committee.len()
    }

    /// Tally is allowed once the reveal window closed or everyone revealed
    pub fn can_tally(&self, now: Timestamp) -> bool {
        self.status == RoundStatus::Open
            && (self.phase_at(now) == RoundPhase::Closed || self.all_revealed())
    }

    pub fn vote_of(&self, validator: &Address) -> Option<Vote> {
        self.reveals.get(validator).map(|r| r.vote)
    }
}

/// How a committee member's stake was treated at settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Revealed a vote matching the final outcome
    Rewarded,
    /// Revealed a vote against the final outcome
    Dissented,
    /// Committed but never revealed
    NotRevealed,
    /// Never committed
    NotCommitted,
    /// Round cancelled; stake returned untouched
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSettlement {
    pub validator: Address,
    pub verdict: Verdict,
    pub unlocked: Amount,
    pub slash: Option<SlashReceipt>,
}

/// Result of counting a round, handed to the job orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyReport {
    pub job_id: JobId,
    pub params_version: u32,
    pub outcome: RoundOutcome,
    pub approvals: u64,
    pub rejections: u64,
    pub committee: Vec<Address>,
    /// Revealers that voted with the outcome, in committee order
    pub participating: Vec<Address>,
    pub tallied_at: Timestamp,
    /// Filled when the round settles at tally time (quorum failure)
    pub settlements: Vec<ValidatorSettlement>,
}

/// Validator stake settlement against a final outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettlement {
    pub job_id: JobId,
    pub final_success: Option<bool>,
    /// Members whose revealed vote matched the final outcome, in committee order
    pub rewarded: Vec<Address>,
    pub settlements: Vec<ValidatorSettlement>,
}
