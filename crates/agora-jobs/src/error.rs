use crate::JobStatus;
use agora_consensus::ConsensusError;
use agora_economics::LedgerError;
use agora_types::{Address, Amount, JobId, Role, Timestamp, TypesError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid status for {operation} on {job_id}: {status:?}")]
    InvalidStatus {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Only the assigned agent may act on {job_id}, caller {caller}")]
    OnlyAgent { job_id: JobId, caller: Address },

    #[error("Identity rejected for {address} as {role}")]
    IdentityRejected { address: Address, role: Role },

    #[error("Deadline for {job_id} passed at {deadline}")]
    DeadlinePassed { job_id: JobId, deadline: Timestamp },

    #[error("Deadline for {job_id} not reached (deadline {deadline})")]
    DeadlineNotReached { job_id: JobId, deadline: Timestamp },

    #[error("Insufficient stake: available {available}, required {required}")]
    InsufficientStake { available: Amount, required: Amount },

    #[error("Stake currently locked: available {available}, requested {requested}")]
    StakeCurrentlyLocked { available: Amount, requested: Amount },

    #[error("Commit phase closed for {job_id} at {deadline}")]
    CommitPhaseClosed { job_id: JobId, deadline: Timestamp },

    #[error("Reveal rejected: {0}")]
    RevealPhaseInvalid(String),

    #[error("Validator {validator} already committed for {job_id}")]
    AlreadyCommitted { validator: Address, job_id: JobId },

    #[error("Quorum not reached for {0}; owner must force finalize")]
    QuorumNotReached(JobId),

    #[error("Dispute window for {job_id} open until {closes_at}")]
    DisputeWindowOpen { job_id: JobId, closes_at: Timestamp },

    #[error("Dispute window for {job_id} closed at {closed_at}")]
    DisputeWindowClosed { job_id: JobId, closed_at: Timestamp },

    #[error("Force finalize for {job_id} not allowed before {allowed_after}")]
    ForceFinalizeTooEarly { job_id: JobId, allowed_after: Timestamp },

    #[error("No dispute for {0}")]
    DisputeNotFound(JobId),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Consensus(ConsensusError),

    #[error(transparent)]
    Types(#[from] TypesError),
}

// Lower-layer failures that belong to the protocol taxonomy surface under
// their protocol names; everything else is wrapped.
impl From<LedgerError> for JobError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidParameters(msg) => JobError::InvalidParameters(msg),
            LedgerError::InsufficientStake {
                available,
                required,
            } => JobError::InsufficientStake {
                available,
                required,
            },
            LedgerError::StakeCurrentlyLocked {
                available,
                requested,
            } => JobError::StakeCurrentlyLocked {
                available,
                requested,
            },
            other => JobError::Ledger(other),
        }
    }
}

impl From<ConsensusError> for JobError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::InvalidParameters(msg) => JobError::InvalidParameters(msg),
            ConsensusError::Unauthorized(msg) => JobError::Unauthorized(msg),
            ConsensusError::NotInCommittee { validator, job_id } => JobError::Unauthorized(
                format!("{} is not on the committee for {}", validator.short(), job_id),
            ),
            ConsensusError::CommitPhaseClosed { job_id, deadline } => {
                JobError::CommitPhaseClosed { job_id, deadline }
            }
            ConsensusError::AlreadyCommitted { validator, job_id } => {
                JobError::AlreadyCommitted { validator, job_id }
            }
            ConsensusError::RevealPhaseInvalid(msg) => JobError::RevealPhaseInvalid(msg),
            ConsensusError::Ledger(inner) => inner.into(),
            other => JobError::Consensus(other),
        }
    }
}
