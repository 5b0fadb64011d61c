use crate::{CertificateIssuer, FeePool, IdentityOracle, ReputationTracker};
use agora_types::{Address, Amount, Hash, JobId, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Per-role allowlist. Proofs are not inspected.
#[derive(Default)]
pub struct AllowlistOracle {
    allowed: Arc<RwLock<HashSet<(Address, Role)>>>,
}

impl AllowlistOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn allow(&self, address: Address, role: Role) {
        self.allowed.write().await.insert((address, role));
        debug!(address = %address.short(), role = %role, "Identity allowlisted");
    }

    pub async fn revoke(&self, address: Address, role: Role) {
        self.allowed.write().await.remove(&(address, role));
    }
}

#[async_trait]
impl IdentityOracle for AllowlistOracle {
    async fn is_eligible(&self, address: Address, role: Role, _proof: &[u8]) -> bool {
        self.allowed.read().await.contains(&(address, role))
    }
}

/// Signed scores with a blacklist at or below a threshold
pub struct InMemoryReputation {
    scores: Arc<RwLock<HashMap<Address, i64>>>,
    blacklist_threshold: i64,
}

impl InMemoryReputation {
    pub fn new(blacklist_threshold: i64) -> Self {
        Self {
            scores: Arc::new(RwLock::new(HashMap::new())),
            blacklist_threshold,
        }
    }

    pub async fn get_reputation(&self, address: &Address) -> i64 {
        self.scores.read().await.get(address).copied().unwrap_or(0)
    }

    pub async fn set_reputation(&self, address: &Address, score: i64) {
        self.scores.write().await.insert(*address, score);
    }
}

#[async_trait]
impl ReputationTracker for InMemoryReputation {
    async fn adjust(&self, address: Address, delta: i64) {
        let mut scores = self.scores.write().await;
        let score = scores.entry(address).or_insert(0);
        let old = *score;
        *score = score.saturating_add(delta);

        if *score <= self.blacklist_threshold && old > self.blacklist_threshold {
            warn!(
                address = %address.short(),
                score = *score,
                threshold = self.blacklist_threshold,
                "🚷 Address blacklisted"
            );
        } else {
            debug!(address = %address.short(), old, new = *score, "Reputation adjusted");
        }
    }

    async fn is_blacklisted(&self, address: Address) -> bool {
        self.get_reputation(&address).await <= self.blacklist_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: u64,
    pub job_id: JobId,
    pub recipient: Address,
    pub metadata_hash: Hash,
}

/// Certificates with monotonic ids starting at 1
#[derive(Default)]
pub struct InMemoryCertificates {
    issued: Arc<RwLock<Vec<Certificate>>>,
}

impl InMemoryCertificates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: u64) -> Option<Certificate> {
        let issued = self.issued.read().await;
        issued.iter().find(|c| c.id == id).cloned()
    }

    pub async fn for_recipient(&self, recipient: &Address) -> Vec<Certificate> {
        let issued = self.issued.read().await;
        issued
            .iter()
            .filter(|c| c.recipient == *recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CertificateIssuer for InMemoryCertificates {
    async fn issue(&self, job_id: JobId, recipient: Address, metadata_hash: Hash) -> u64 {
        let mut issued = self.issued.write().await;
        let id = issued.len() as u64 + 1;
        issued.push(Certificate {
            id,
            job_id,
            recipient,
            metadata_hash,
        });
        info!(
            certificate_id = id,
            job_id = %job_id,
            recipient = %recipient.short(),
            "🎓 Certificate issued"
        );
        id
    }
}

/// Running total of fees received
#[derive(Default)]
pub struct InMemoryFeePool {
    total: Arc<RwLock<Amount>>,
    deposits: Arc<RwLock<u64>>,
}

impl InMemoryFeePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn total(&self) -> Amount {
        *self.total.read().await
    }

    pub async fn deposit_count(&self) -> u64 {
        *self.deposits.read().await
    }
}

#[async_trait]
impl FeePool for InMemoryFeePool {
    async fn deposit_fee(&self, amount: Amount) {
        let mut total = self.total.write().await;
        *total = total.saturating_add(amount);
        *self.deposits.write().await += 1;
        debug!(amount = amount.as_u64(), total = total.as_u64(), "Fee deposited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allowlist_is_per_role() {
        let oracle = AllowlistOracle::new();
        let a = Address::from_bytes([1; 32]);
        oracle.allow(a, Role::Agent).await;
        assert!(oracle.is_eligible(a, Role::Agent, &[]).await);
        assert!(!oracle.is_eligible(a, Role::Validator, &[]).await);
        oracle.revoke(a, Role::Agent).await;
        assert!(!oracle.is_eligible(a, Role::Agent, &[]).await);
    }

    #[tokio::test]
    async fn test_blacklist_threshold() {
        let rep = InMemoryReputation::new(-10);
        let a = Address::from_bytes([2; 32]);
        assert!(!rep.is_blacklisted(a).await);
        rep.adjust(a, -9).await;
        assert!(!rep.is_blacklisted(a).await);
        rep.adjust(a, -1).await;
        assert!(rep.is_blacklisted(a).await);
        rep.adjust(a, 5).await;
        assert_eq!(rep.get_reputation(&a).await, -5);
        assert!(!rep.is_blacklisted(a).await);
    }

    #[tokio::test]
    async fn test_certificate_ids_monotonic() {
        let certs = InMemoryCertificates::new();
        let a = Address::from_bytes([3; 32]);
        assert_eq!(certs.issue(JobId::new(1), a, [0; 32]).await, 1);
        assert_eq!(certs.issue(JobId::new(2), a, [1; 32]).await, 2);
        assert_eq!(certs.for_recipient(&a).await.len(), 2);
        assert_eq!(certs.get(2).await.unwrap().job_id, JobId::new(2));
    }

    #[tokio::test]
    async fn test_fee_pool_totals() {
        let pool = InMemoryFeePool::new();
        pool.deposit_fee(Amount::new(2)).await;
        pool.deposit_fee(Amount::new(3)).await;
        assert_eq!(pool.total().await, Amount::new(5));
        assert_eq!(pool.deposit_count().await, 2);
    }
}
