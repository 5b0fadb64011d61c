use agora_economics::LedgerError;
use agora_types::{Address, JobId, Timestamp, TypesError};
use agora_vrf::BeaconError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("No validation round for {0}")]
    RoundNotFound(JobId),

    #[error("Validation round already exists for {0}")]
    RoundExists(JobId),

    #[error("Validation round for {0} is no longer open")]
    RoundClosed(JobId),

    #[error("Validator {validator} is not on the committee for {job_id}")]
    NotInCommittee { validator: Address, job_id: JobId },

    #[error("Commit phase closed for {job_id} at {deadline}")]
    CommitPhaseClosed { job_id: JobId, deadline: Timestamp },

    #[error("Validator {validator} already committed for {job_id}")]
    AlreadyCommitted { validator: Address, job_id: JobId },

    #[error("Reveal rejected: {0}")]
    RevealPhaseInvalid(String),

    #[error("Reveal window for {job_id} open until {closes_at}")]
    RevealWindowOpen { job_id: JobId, closes_at: Timestamp },

    #[error("Round for {0} has not been tallied")]
    NotTallied(JobId),

    #[error("Insufficient validators: needed {needed}, available {available}")]
    InsufficientValidators { needed: usize, available: usize },

    #[error("Validator {0} is not registered")]
    ValidatorNotRegistered(Address),

    #[error("Unknown parameter version {0}")]
    UnknownParamsVersion(u32),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Beacon(#[from] BeaconError),

    #[error(transparent)]
    Types(#[from] TypesError),
}
