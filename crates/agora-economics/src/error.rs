use agora_types::{Address, Amount, Role, TypesError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Insufficient balance for {address}: available {available}, required {required}")]
    InsufficientBalance {
        address: Address,
        available: Amount,
        required: Amount,
    },

    #[error("Insufficient stake: available {available}, required {required}")]
    InsufficientStake { available: Amount, required: Amount },

    #[error("Stake currently locked: available {available}, requested {requested}")]
    StakeCurrentlyLocked { available: Amount, requested: Amount },

    #[error("Locked stake too small for {participant} ({role}): locked {locked}, requested {requested}")]
    LockedStakeTooSmall {
        participant: Address,
        role: Role,
        locked: Amount,
        requested: Amount,
    },

    #[error("Escrow lock not found: {0}")]
    LockNotFound(String),

    #[error("Escrow lock already exists: {0}")]
    LockExists(String),

    #[error("Payouts {payouts} exceed escrowed amount {locked}")]
    PayoutExceedsLock { payouts: Amount, locked: Amount },

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error(transparent)]
    Types(#[from] TypesError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
