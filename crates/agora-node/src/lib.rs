//! Operator tooling for the agora settlement protocol: configuration loading,
//! logging setup, prometheus metrics and deterministic scenario replay.

pub mod config_loader;
pub mod logging;
pub mod metrics;
pub mod scenario;

pub use config_loader::{
    BeaconKind, BeaconSection, LoggingConfig, ProtocolConfig, ReputationSection,
};
pub use metrics::Metrics;
pub use scenario::{content_hash, Action, ReplaySummary, Scenario, ScenarioRunner, ScenarioStep};
