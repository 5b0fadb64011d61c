pub mod beacon;
pub mod canonical;
pub mod error;
pub mod messages;
pub mod service;

pub use beacon::{DeterministicBeacon, RandomnessBeacon};
pub use canonical::{compute_challenge, compute_round_seed};
pub use error::{BeaconError, Result};
pub use messages::{commitment_for, BeaconState, SeedCommit, SeedReveal};
pub use service::{BeaconConfig, CommitRevealBeacon};
