//! Interfaces to services outside the settlement core.

use agora_types::{Address, Amount, Hash, JobId, Role};
use async_trait::async_trait;

/// Answers whether an address is authorised to act in a role
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    async fn is_eligible(&self, address: Address, role: Role, proof: &[u8]) -> bool;
}

#[async_trait]
pub trait ReputationTracker: Send + Sync {
    async fn adjust(&self, address: Address, delta: i64);
    async fn is_blacklisted(&self, address: Address) -> bool;
}

/// Mints completion certificates for successful jobs
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, job_id: JobId, recipient: Address, metadata_hash: Hash) -> u64;
}

/// Receives protocol fees; funds handed here have left the ledger
#[async_trait]
pub trait FeePool: Send + Sync {
    async fn deposit_fee(&self, amount: Amount);
}
