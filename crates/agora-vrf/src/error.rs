use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeaconError {
    #[error("No commitments for round {0}")]
    UnknownRound(u64),

    #[error("Seed for round {round_id} not available before {available_at}")]
    SeedNotAvailable { round_id: u64, available_at: u64 },

    #[error("Commit phase closed for round {0}")]
    CommitPhaseClosed(u64),

    #[error("Reveal window closed for round {0}")]
    RevealWindowClosed(u64),

    #[error("Duplicate commit from {0} for round {1}")]
    DuplicateCommit(String, u64),

    #[error("No commit from {0} for round {1}")]
    CommitNotFound(String, u64),

    #[error("Commitment mismatch: expected {expected}, got {actual}")]
    CommitmentMismatch { expected: String, actual: String },

    #[error("No reveals for round {0}")]
    NoReveals(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, BeaconError>;
