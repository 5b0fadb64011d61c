//! Protocol configuration loader
//!
//! A single TOML file carries every tunable of a protocol instance. Missing
//! sections fall back to their defaults, so an empty file is a valid devnet.

use agora_consensus::ConsensusParams;
use agora_economics::LedgerConfig;
use agora_jobs::{DisputeConfig, JobConfig, ProtocolSettings};
use agora_types::Address;
use agora_vrf::BeaconConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub ledger: LedgerConfig,
    pub consensus: ConsensusParams,
    pub beacon: BeaconSection,
    pub jobs: JobConfig,
    pub disputes: DisputeConfig,
    pub reputation: ReputationSection,
    pub logging: LoggingConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            consensus: ConsensusParams::default(),
            beacon: BeaconSection::default(),
            jobs: JobConfig::default(),
            disputes: DisputeConfig::default(),
            reputation: ReputationSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which randomness beacon seeds committee selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconKind {
    /// Seeds derived from `label`; reproducible and known in advance
    #[default]
    Deterministic,
    /// Seeds mixed from contributor secrets once the reveal delay has passed
    CommitReveal,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeaconSection {
    pub kind: BeaconKind,
    /// Domain label the deterministic beacon derives its seeds from
    pub label: String,
    pub commit_reveal: BeaconConfig,
}

impl Default for BeaconSection {
    fn default() -> Self {
        Self {
            kind: BeaconKind::Deterministic,
            label: "agora-devnet".to_string(),
            commit_reveal: BeaconConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReputationSection {
    pub blacklist_threshold: i64,
}

impl Default for ReputationSection {
    fn default() -> Self {
        Self {
            blacklist_threshold: ProtocolSettings::default().blacklist_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
    pub module_filters: HashMap<String, String>,
    pub file_output: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            module_filters: HashMap::new(),
            file_output: None,
        }
    }
}

impl ProtocolConfig {
    /// Load, apply `AGORA_*` overrides, validate
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "⚙️ Loading protocol configuration");

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            owner = %config.jobs.owner.short(),
            moderator = %config.disputes.moderator.short(),
            committee_min = config.consensus.min_committee_size,
            committee_max = config.consensus.max_committee_size,
            beacon = ?config.beacon.kind,
            dispute_window_secs = config.disputes.window_secs,
            "✅ Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Only operational settings and role addresses can be overridden; the
    /// economic and consensus parameters must come from the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Overrides keyed by `AGORA_*` variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(level) = lookup("AGORA_LOG_LEVEL") {
            info!(old = %self.logging.level, new = %level, "Overriding log level from environment");
            self.logging.level = level;
        }

        if let Some(format) = lookup("AGORA_LOG_FORMAT") {
            info!(old = %self.logging.format, new = %format, "Overriding log format from environment");
            self.logging.format = format;
        }

        if let Some(owner) = lookup("AGORA_OWNER") {
            let owner = parse_address("AGORA_OWNER", &owner)?;
            info!(old = %self.jobs.owner.short(), new = %owner.short(), "Overriding owner from environment");
            self.jobs.owner = owner;
        }

        if let Some(moderator) = lookup("AGORA_MODERATOR") {
            let moderator = parse_address("AGORA_MODERATOR", &moderator)?;
            info!(
                old = %self.disputes.moderator.short(),
                new = %moderator.short(),
                "Overriding moderator from environment"
            );
            self.disputes.moderator = moderator;
        }

        if let Some(label) = lookup("AGORA_BEACON_LABEL") {
            info!(old = %self.beacon.label, new = %label, "Overriding beacon label from environment");
            self.beacon.label = label;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.ledger
            .validate()
            .context("Invalid [ledger] section")?;
        self.consensus
            .validate()
            .context("Invalid [consensus] section")?;
        self.jobs.validate().context("Invalid [jobs] section")?;

        if self.disputes.appeal_bond.is_zero() {
            anyhow::bail!("disputes.appeal_bond must be > 0");
        }
        match self.beacon.kind {
            BeaconKind::Deterministic if self.beacon.label.is_empty() => {
                anyhow::bail!("beacon.label must not be empty");
            }
            BeaconKind::Deterministic => {}
            BeaconKind::CommitReveal => self
                .beacon
                .commit_reveal
                .validate()
                .context("Invalid [beacon.commit_reveal] section")?,
        }
        if self.reputation.blacklist_threshold >= 0 {
            anyhow::bail!(
                "reputation.blacklist_threshold={} would blacklist fresh participants",
                self.reputation.blacklist_threshold
            );
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => anyhow::bail!(
                "Invalid logging.format '{}'. Valid options: pretty, compact, json",
                other
            ),
        }
        Ok(())
    }

    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            ledger: self.ledger.clone(),
            consensus: self.consensus.clone(),
            jobs: self.jobs.clone(),
            disputes: self.disputes.clone(),
            blacklist_threshold: self.reputation.blacklist_threshold,
        }
    }
}

fn parse_address(var: &str, value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .with_context(|| format!("{} is not a 32-byte hex address", var))
}
