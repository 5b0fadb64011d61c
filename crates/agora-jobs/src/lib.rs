pub mod collaborators;
pub mod config;
pub mod disputes;
pub mod error;
pub mod events;
pub mod job_manager;
pub mod memory;
pub mod protocol;
pub mod settlement;
pub mod types;

pub use collaborators::{CertificateIssuer, FeePool, IdentityOracle, ReputationTracker};
pub use config::{DisputeConfig, ForceFinalizePolicy, JobConfig};
pub use disputes::{Dispute, DisputeManager, DisputeResolution, DisputeStatus};
pub use error::{JobError, Result};
pub use events::{EventLog, EventRecord, ProtocolEvent, Receipt};
pub use job_manager::{Collaborators, JobManager};
pub use memory::{
    AllowlistOracle, Certificate, InMemoryCertificates, InMemoryFeePool, InMemoryReputation,
};
pub use protocol::{Protocol, ProtocolCounters, ProtocolSettings};
pub use settlement::{plan_failure, plan_success, split_pool, PayoutPlan};
pub use types::{Job, JobStatus, NewJob, PendingOutcome};
