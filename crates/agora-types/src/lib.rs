pub mod amount;
pub mod error;
pub mod id;
pub mod keys;
pub mod role;
pub mod time;

pub use amount::{Amount, BasisPoints, BPS_DENOMINATOR};
pub use error::{Result, TypesError};
pub use id::{hash_parts, short_hex, Hash, JobId};
pub use keys::Address;
pub use role::Role;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};

/// Protocol version stamped into event records
pub const PROTOCOL_VERSION: u8 = 1;
