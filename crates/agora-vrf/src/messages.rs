use agora_types::{hash_parts, Address, Hash, Timestamp};
use serde::{Deserialize, Serialize};

/// Commitment to a beacon secret for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCommit {
    pub round_id: u64,
    pub contributor: Address,
    pub commitment: Hash,
}

impl SeedCommit {
    pub fn new(round_id: u64, contributor: Address, secret: &[u8; 32]) -> Self {
        Self {
            round_id,
            contributor,
            commitment: commitment_for(round_id, &contributor, secret),
        }
    }

    pub fn verify(&self, secret: &[u8; 32]) -> bool {
        commitment_for(self.round_id, &self.contributor, secret) == self.commitment
    }
}

/// Opening of a previously committed secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReveal {
    pub round_id: u64,
    pub contributor: Address,
    pub secret: [u8; 32],
}

pub fn commitment_for(round_id: u64, contributor: &Address, secret: &[u8; 32]) -> Hash {
    hash_parts(&[
        b"agora-beacon-commit",
        secret,
        contributor.as_bytes(),
        &round_id.to_be_bytes(),
    ])
}

/// Commit-reveal progress for one beacon round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconState {
    pub round_id: u64,
    pub opened_at: Timestamp,
    pub commits: Vec<SeedCommit>,
    pub reveals: Vec<SeedReveal>,
    pub seed: Option<Hash>,
}

impl BeaconState {
    pub fn new(round_id: u64, opened_at: Timestamp) -> Self {
        Self {
            round_id,
            opened_at,
            commits: Vec::new(),
            reveals: Vec::new(),
            seed: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.seed.is_some()
    }
}
