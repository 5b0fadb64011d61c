use crate::balance::LockedMove;
use crate::{BalanceManager, LedgerError, Result};
use agora_types::{Address, Amount, JobId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(String);

impl LockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an escrow lock is holding funds for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowKind {
    /// Employer's reward for a job
    JobReward { job_id: JobId, employer: Address },

    /// Bond posted by whoever raised a dispute
    AppealBond { job_id: JobId, raiser: Address },
}

impl EscrowKind {
    pub fn to_lock_id(&self) -> LockId {
        match self {
            EscrowKind::JobReward { job_id, employer } => LockId::new(format!(
                "job_reward_{}_{}",
                job_id.value(),
                employer.short()
            )),
            EscrowKind::AppealBond { job_id, raiser } => LockId::new(format!(
                "appeal_bond_{}_{}",
                job_id.value(),
                raiser.short()
            )),
        }
    }

    pub fn owner(&self) -> Address {
        match self {
            EscrowKind::JobReward { employer, .. } => *employer,
            EscrowKind::AppealBond { raiser, .. } => *raiser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub kind: EscrowKind,
    pub amount: Amount,
    pub locked_at: Timestamp,
    pub owner: Address,
}

/// Recipient of a payout from escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payee {
    Account(Address),
    /// Leaves the ledger, e.g. a protocol fee handed to the fee pool
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub payee: Payee,
    pub amount: Amount,
}

impl Payout {
    pub fn to(address: Address, amount: Amount) -> Self {
        Self {
            payee: Payee::Account(address),
            amount,
        }
    }

    pub fn external(amount: Amount) -> Self {
        Self {
            payee: Payee::External,
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSettlement {
    pub lock_id: LockId,
    pub paid: Amount,
    pub exported: Amount,
    pub refunded: Amount,
}

/// Escrow wraps [`BalanceManager`] locks with per-purpose bookkeeping
pub struct EscrowManager {
    balances: Arc<BalanceManager>,
    locks: Arc<RwLock<HashMap<LockId, LockMetadata>>>,
}

impl EscrowManager {
    pub fn new(balances: Arc<BalanceManager>) -> Self {
        Self {
            balances,
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn balances(&self) -> &Arc<BalanceManager> {
        &self.balances
    }

    /// Reserve `amount` of the owner's available balance
    pub async fn lock(&self, kind: EscrowKind, amount: Amount, now: Timestamp) -> Result<LockId> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidParameters(
                "escrow amount must be positive".to_string(),
            ));
        }
        let lock_id = kind.to_lock_id();
        let owner = kind.owner();

        let mut locks = self.locks.write().await;
        if locks.contains_key(&lock_id) {
            return Err(LedgerError::LockExists(lock_id.to_string()));
        }

        self.balances.lock(owner, amount).await?;
        locks.insert(
            lock_id.clone(),
            LockMetadata {
                kind: kind.clone(),
                amount,
                locked_at: now,
                owner,
            },
        );

        info!(
            lock_id = %lock_id,
            owner = %owner.short(),
            amount = amount.as_u64(),
            escrow_kind = ?kind,
            "💰 Escrow locked"
        );
        Ok(lock_id)
    }

    /// Pay out of a lock and refund whatever is left to its owner. The lock is
    /// consumed.
    pub async fn settle(&self, lock_id: &LockId, payouts: &[Payout]) -> Result<EscrowSettlement> {
        let mut locks = self.locks.write().await;
        let metadata = locks
            .get(lock_id)
            .cloned()
            .ok_or_else(|| LedgerError::LockNotFound(lock_id.to_string()))?;

        let paid_total = Amount::sum(payouts.iter().map(|p| &p.amount))?;
        let refund = metadata
            .amount
            .checked_sub(paid_total)
            .ok_or(LedgerError::PayoutExceedsLock {
                payouts: paid_total,
                locked: metadata.amount,
            })?;

        let mut paid = Amount::ZERO;
        let mut exported = Amount::ZERO;
        let moves: Vec<LockedMove> = payouts
            .iter()
            .filter(|p| !p.amount.is_zero())
            .map(|p| match p.payee {
                Payee::Account(to) => {
                    paid = paid.saturating_add(p.amount);
                    LockedMove::Pay(to, p.amount)
                }
                Payee::External => {
                    exported = exported.saturating_add(p.amount);
                    LockedMove::Export(p.amount)
                }
            })
            .collect();

        self.balances
            .settle_locked(metadata.owner, &moves, refund)
            .await?;
        locks.remove(lock_id);

        info!(
            lock_id = %lock_id,
            owner = %metadata.owner.short(),
            locked = metadata.amount.as_u64(),
            paid = paid.as_u64(),
            exported = exported.as_u64(),
            refunded = refund.as_u64(),
            "🔓 Escrow settled"
        );

        Ok(EscrowSettlement {
            lock_id: lock_id.clone(),
            paid,
            exported,
            refunded: refund,
        })
    }

    /// Return the whole lock to its owner
    pub async fn refund(&self, lock_id: &LockId) -> Result<Amount> {
        let settlement = self.settle(lock_id, &[]).await?;
        Ok(settlement.refunded)
    }

    pub async fn get_lock(&self, lock_id: &LockId) -> Option<LockMetadata> {
        self.locks.read().await.get(lock_id).cloned()
    }

    pub async fn total_escrowed(&self) -> Amount {
        let locks = self.locks.read().await;
        locks
            .values()
            .fold(Amount::ZERO, |acc, m| acc.saturating_add(m.amount))
    }
}
