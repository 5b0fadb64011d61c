use agora_types::{hash_parts, Address, Hash, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Approve,
    Reject,
}

impl Vote {
    pub fn from_approval(approve: bool) -> Self {
        if approve {
            Vote::Approve
        } else {
            Vote::Reject
        }
    }

    pub fn is_approve(&self) -> bool {
        matches!(self, Vote::Approve)
    }

    fn as_byte(&self) -> u8 {
        match self {
            Vote::Approve => 1,
            Vote::Reject => 0,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Approve => write!(f, "approve"),
            Vote::Reject => write!(f, "reject"),
        }
    }
}

/// H(vote || salt || validator || job_id). Binding the validator and job means
/// a commitment cannot be replayed by another validator or on another job.
pub fn compute_commitment(vote: Vote, salt: &[u8; 32], validator: &Address, job_id: JobId) -> Hash {
    hash_parts(&[
        &[vote.as_byte()],
        salt,
        validator.as_bytes(),
        &job_id.to_be_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_binds_every_input() {
        let v = Address::from_bytes([1; 32]);
        let base = compute_commitment(Vote::Approve, &[5; 32], &v, JobId::new(1));
        assert_ne!(base, compute_commitment(Vote::Reject, &[5; 32], &v, JobId::new(1)));
        assert_ne!(base, compute_commitment(Vote::Approve, &[6; 32], &v, JobId::new(1)));
        assert_ne!(
            base,
            compute_commitment(Vote::Approve, &[5; 32], &Address::from_bytes([2; 32]), JobId::new(1))
        );
        assert_ne!(base, compute_commitment(Vote::Approve, &[5; 32], &v, JobId::new(2)));
    }
}
