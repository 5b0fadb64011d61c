use crate::{ConsensusError, Result};
use agora_types::{Address, BasisPoints};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Owner-tunable round parameters. Each round keeps the version it was
/// opened with, so updates never reach in-flight rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    pub commit_window_secs: u64,
    pub reveal_window_secs: u64,
    pub min_committee_size: usize,
    pub max_committee_size: usize,
    /// Share of revealed votes that must approve
    pub approval_threshold: BasisPoints,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            commit_window_secs: 3_600,
            reveal_window_secs: 3_600,
            min_committee_size: 3,
            max_committee_size: 5,
            approval_threshold: BasisPoints::new_const(6_000),
        }
    }
}

impl ConsensusParams {
    pub fn validate(&self) -> Result<()> {
        if self.commit_window_secs == 0 || self.reveal_window_secs == 0 {
            return Err(ConsensusError::InvalidParameters(
                "commit and reveal windows must be non-zero".to_string(),
            ));
        }
        if self.min_committee_size == 0 || self.min_committee_size > self.max_committee_size {
            return Err(ConsensusError::InvalidParameters(format!(
                "committee bounds must satisfy 0 < min ({}) <= max ({})",
                self.min_committee_size, self.max_committee_size
            )));
        }
        if self.approval_threshold == BasisPoints::ZERO {
            return Err(ConsensusError::InvalidParameters(
                "approval threshold must be at least 1 bps".to_string(),
            ));
        }
        Ok(())
    }
}

/// Versioned parameter arena; version ids index into it
pub struct ParamsRegistry {
    owner: Address,
    versions: Arc<RwLock<Vec<ConsensusParams>>>,
}

impl ParamsRegistry {
    pub fn new(owner: Address, initial: ConsensusParams) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            owner,
            versions: Arc::new(RwLock::new(vec![initial])),
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Latest version id and its parameters
    pub async fn current(&self) -> (u32, ConsensusParams) {
        let versions = self.versions.read().await;
        let version = versions.len() - 1;
        (version as u32, versions[version].clone())
    }

    pub async fn get(&self, version: u32) -> Result<ConsensusParams> {
        let versions = self.versions.read().await;
        versions
            .get(version as usize)
            .cloned()
            .ok_or(ConsensusError::UnknownParamsVersion(version))
    }

    /// Publish a new version; only the owner may do so
    pub async fn update(&self, caller: Address, params: ConsensusParams) -> Result<u32> {
        if caller != self.owner {
            return Err(ConsensusError::Unauthorized(format!(
                "{} may not update consensus parameters",
                caller.short()
            )));
        }
        params.validate()?;

        let mut versions = self.versions.write().await;
        versions.push(params.clone());
        let version = (versions.len() - 1) as u32;

        info!(
            version,
            commit_window_secs = params.commit_window_secs,
            reveal_window_secs = params.reveal_window_secs,
            min_committee = params.min_committee_size,
            max_committee = params.max_committee_size,
            threshold_bps = params.approval_threshold.value(),
            "⚙️ Consensus parameters updated"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_append() {
        let owner = Address::from_bytes([1; 32]);
        let registry = ParamsRegistry::new(owner, ConsensusParams::default()).unwrap();
        assert_eq!(registry.current().await.0, 0);

        let updated = ConsensusParams {
            commit_window_secs: 60,
            ..ConsensusParams::default()
        };
        let version = registry.update(owner, updated.clone()).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(registry.get(0).await.unwrap(), ConsensusParams::default());
        assert_eq!(registry.get(1).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_only_owner_updates() {
        let registry =
            ParamsRegistry::new(Address::from_bytes([1; 32]), ConsensusParams::default()).unwrap();
        let err = registry
            .update(Address::from_bytes([2; 32]), ConsensusParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::Unauthorized(_)));
        assert_eq!(registry.current().await.0, 0);
    }

    #[test]
    fn test_rejects_inverted_committee_bounds() {
        let params = ConsensusParams {
            min_committee_size: 4,
            max_committee_size: 3,
            ..ConsensusParams::default()
        };
        assert!(params.validate().is_err());
    }
}
