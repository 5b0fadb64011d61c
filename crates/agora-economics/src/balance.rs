use crate::{LedgerError, Result};
use agora_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: Amount,
    pub locked: Amount,
}

impl AccountInfo {
    pub fn available(&self) -> Amount {
        self.balance.saturating_sub(self.locked)
    }
}

/// Running totals of value entering and leaving the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyTotals {
    /// Minted into balances from outside the protocol
    pub issued: Amount,
    /// Handed to external sinks (fee pool)
    pub exported: Amount,
    /// Destroyed by slashing
    pub burned: Amount,
}

/// One movement out of an owner's locked balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockedMove {
    Pay(Address, Amount),
    Export(Amount),
}

#[derive(Debug, Default)]
struct BalanceBook {
    accounts: HashMap<Address, AccountInfo>,
    totals: SupplyTotals,
}

/// Liquid balances per address. Every fund movement in the protocol starts or
/// ends here.
pub struct BalanceManager {
    book: Arc<RwLock<BalanceBook>>,
}

impl Default for BalanceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceManager {
    pub fn new() -> Self {
        Self {
            book: Arc::new(RwLock::new(BalanceBook::default())),
        }
    }

    pub async fn get_balance(&self, address: Address) -> Amount {
        let book = self.book.read().await;
        book.accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    pub async fn get_locked(&self, address: Address) -> Amount {
        let book = self.book.read().await;
        book.accounts
            .get(&address)
            .map(|a| a.locked)
            .unwrap_or_default()
    }

    pub async fn get_available(&self, address: Address) -> Amount {
        let book = self.book.read().await;
        book.accounts
            .get(&address)
            .map(|a| a.available())
            .unwrap_or_default()
    }

    pub async fn get_account(&self, address: Address) -> AccountInfo {
        let book = self.book.read().await;
        book.accounts.get(&address).cloned().unwrap_or_default()
    }

    pub async fn totals(&self) -> SupplyTotals {
        self.book.read().await.totals
    }

    /// Sum of all balances, locked portions included
    pub async fn total_balances(&self) -> Result<Amount> {
        let book = self.book.read().await;
        Ok(Amount::sum(book.accounts.values().map(|a| &a.balance))?)
    }

    /// Fund an address from outside the protocol
    pub async fn mint(&self, address: Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidParameters(
                "mint amount must be positive".to_string(),
            ));
        }
        let mut book = self.book.write().await;
        let issued = book
            .totals
            .issued
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("issued total".to_string()))?;
        let info = book.accounts.entry(address).or_default();
        info.balance = info
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("balance".to_string()))?;
        let balance_after = info.balance;
        book.totals.issued = issued;

        info!(
            address = %address.short(),
            amount = amount.as_u64(),
            balance_after = balance_after.as_u64(),
            "🪙 Balance minted"
        );
        Ok(())
    }

    /// Move available funds between two addresses
    pub async fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidParameters(
                "transfer amount must be positive".to_string(),
            ));
        }
        let mut book = self.book.write().await;
        Self::ensure_available(&book, from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = book.accounts.get(&to).map(|a| a.balance).unwrap_or_default();
        let new_to = to_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("balance".to_string()))?;

        let sender = book.accounts.entry(from).or_default();
        sender.balance = sender.balance.saturating_sub(amount);
        book.accounts.entry(to).or_default().balance = new_to;

        info!(
            from = %from.short(),
            to = %to.short(),
            amount = amount.as_u64(),
            "💸 Transfer completed"
        );
        Ok(())
    }

    pub async fn lock(&self, address: Address, amount: Amount) -> Result<()> {
        let mut book = self.book.write().await;
        Self::ensure_available(&book, address, amount)?;
        let info = book.accounts.entry(address).or_default();
        let locked_before = info.locked;
        info.locked = info.locked.saturating_add(amount);

        debug!(
            address = %address.short(),
            amount = amount.as_u64(),
            locked_before = locked_before.as_u64(),
            locked_after = info.locked.as_u64(),
            "🔒 Balance locked"
        );
        Ok(())
    }

    pub async fn unlock(&self, address: Address, amount: Amount) -> Result<()> {
        let mut book = self.book.write().await;
        let info = book.accounts.entry(address).or_default();
        if info.locked < amount {
            return Err(LedgerError::InsufficientBalance {
                address,
                available: info.locked,
                required: amount,
            });
        }
        info.locked = info.locked.saturating_sub(amount);

        debug!(
            address = %address.short(),
            amount = amount.as_u64(),
            locked_after = info.locked.as_u64(),
            "🔓 Balance unlocked"
        );
        Ok(())
    }

    /// Remove available funds (stake deposits move value out of the liquid book)
    pub(crate) async fn debit(&self, address: Address, amount: Amount) -> Result<()> {
        let mut book = self.book.write().await;
        Self::ensure_available(&book, address, amount)?;
        let info = book.accounts.entry(address).or_default();
        info.balance = info.balance.saturating_sub(amount);
        Ok(())
    }

    /// Credit several addresses in one step; nothing is applied if any would overflow
    pub(crate) async fn credit_many(&self, credits: &[(Address, Amount)]) -> Result<()> {
        let mut book = self.book.write().await;
        let mut pending: HashMap<Address, Amount> = HashMap::new();
        for (address, amount) in credits {
            let current = match pending.get(address) {
                Some(a) => *a,
                None => book
                    .accounts
                    .get(address)
                    .map(|a| a.balance)
                    .unwrap_or_default(),
            };
            let next = current
                .checked_add(*amount)
                .ok_or_else(|| LedgerError::Overflow("balance".to_string()))?;
            pending.insert(*address, next);
        }
        for (address, balance) in pending {
            book.accounts.entry(address).or_default().balance = balance;
        }
        Ok(())
    }

    pub(crate) async fn record_burn(&self, amount: Amount) {
        let mut book = self.book.write().await;
        book.totals.burned = book.totals.burned.saturating_add(amount);
    }

    /// Apply a set of movements out of `owner`'s locked funds and return
    /// `refund` to their available balance, all under one guard.
    pub(crate) async fn settle_locked(
        &self,
        owner: Address,
        moves: &[LockedMove],
        refund: Amount,
    ) -> Result<()> {
        let mut book = self.book.write().await;

        let mut outgoing = Amount::ZERO;
        let mut exported = Amount::ZERO;
        let mut credits: HashMap<Address, Amount> = HashMap::new();
        for mv in moves {
            let amount = match mv {
                LockedMove::Pay(to, amount) => {
                    let entry = credits.entry(*to).or_default();
                    *entry = entry
                        .checked_add(*amount)
                        .ok_or_else(|| LedgerError::Overflow("payout".to_string()))?;
                    *amount
                }
                LockedMove::Export(amount) => {
                    exported = exported
                        .checked_add(*amount)
                        .ok_or_else(|| LedgerError::Overflow("export".to_string()))?;
                    *amount
                }
            };
            outgoing = outgoing
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Overflow("payout".to_string()))?;
        }

        let released = outgoing
            .checked_add(refund)
            .ok_or_else(|| LedgerError::Overflow("release".to_string()))?;
        let owner_info = book.accounts.get(&owner).cloned().unwrap_or_default();
        if owner_info.locked < released || owner_info.balance < outgoing {
            return Err(LedgerError::InsufficientBalance {
                address: owner,
                available: owner_info.locked,
                required: released,
            });
        }
        let new_exported = book
            .totals
            .exported
            .checked_add(exported)
            .ok_or_else(|| LedgerError::Overflow("exported total".to_string()))?;

        // Validate recipient balances before mutating anything
        let mut new_balances = Vec::with_capacity(credits.len());
        for (to, amount) in &credits {
            if *to == owner {
                continue;
            }
            let current = book.accounts.get(to).map(|a| a.balance).unwrap_or_default();
            let next = current
                .checked_add(*amount)
                .ok_or_else(|| LedgerError::Overflow("balance".to_string()))?;
            new_balances.push((*to, next));
        }
        let paid_to_self = credits.get(&owner).copied().unwrap_or_default();

        let info = book.accounts.entry(owner).or_default();
        info.locked = info.locked.saturating_sub(released);
        info.balance = info
            .balance
            .saturating_sub(outgoing)
            .saturating_add(paid_to_self);
        for (to, balance) in new_balances {
            book.accounts.entry(to).or_default().balance = balance;
        }
        book.totals.exported = new_exported;

        debug!(
            owner = %owner.short(),
            outgoing = outgoing.as_u64(),
            exported = exported.as_u64(),
            refund = refund.as_u64(),
            recipients = credits.len(),
            "📤 Locked funds settled"
        );
        Ok(())
    }

    fn ensure_available(book: &BalanceBook, address: Address, amount: Amount) -> Result<()> {
        let available = book
            .accounts
            .get(&address)
            .map(|a| a.available())
            .unwrap_or_default();
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address,
                available,
                required: amount,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[tokio::test]
    async fn test_basic_operations() {
        let manager = BalanceManager::new();
        manager.mint(addr(1), Amount::new(100)).await.unwrap();
        assert_eq!(manager.get_balance(addr(1)).await, Amount::new(100));

        manager
            .transfer(addr(1), addr(2), Amount::new(30))
            .await
            .unwrap();
        assert_eq!(manager.get_balance(addr(1)).await, Amount::new(70));
        assert_eq!(manager.get_balance(addr(2)).await, Amount::new(30));
        assert_eq!(manager.totals().await.issued, Amount::new(100));
    }

    #[tokio::test]
    async fn test_locking() {
        let manager = BalanceManager::new();
        manager.mint(addr(3), Amount::new(100)).await.unwrap();
        manager.lock(addr(3), Amount::new(40)).await.unwrap();

        assert_eq!(manager.get_locked(addr(3)).await, Amount::new(40));
        assert_eq!(manager.get_available(addr(3)).await, Amount::new(60));

        // Cannot lock more than available
        assert!(manager.lock(addr(3), Amount::new(70)).await.is_err());
        // Locked funds cannot be transferred
        assert!(manager
            .transfer(addr(3), addr(4), Amount::new(61))
            .await
            .is_err());

        manager.unlock(addr(3), Amount::new(20)).await.unwrap();
        assert_eq!(manager.get_locked(addr(3)).await, Amount::new(20));
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_state() {
        let manager = BalanceManager::new();
        manager.mint(addr(4), Amount::new(50)).await.unwrap();

        let err = manager
            .transfer(addr(4), addr(5), Amount::new(100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(manager.get_balance(addr(4)).await, Amount::new(50));
        assert_eq!(manager.get_balance(addr(5)).await, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_settle_locked_pays_exports_and_refunds() {
        let manager = BalanceManager::new();
        manager.mint(addr(6), Amount::new(100)).await.unwrap();
        manager.lock(addr(6), Amount::new(100)).await.unwrap();

        manager
            .settle_locked(
                addr(6),
                &[
                    LockedMove::Pay(addr(7), Amount::new(60)),
                    LockedMove::Export(Amount::new(10)),
                ],
                Amount::new(30),
            )
            .await
            .unwrap();

        assert_eq!(manager.get_balance(addr(6)).await, Amount::new(30));
        assert_eq!(manager.get_locked(addr(6)).await, Amount::ZERO);
        assert_eq!(manager.get_balance(addr(7)).await, Amount::new(60));
        assert_eq!(manager.totals().await.exported, Amount::new(10));
    }

    #[tokio::test]
    async fn test_settle_locked_rejects_overdraw() {
        let manager = BalanceManager::new();
        manager.mint(addr(8), Amount::new(50)).await.unwrap();
        manager.lock(addr(8), Amount::new(20)).await.unwrap();

        assert!(manager
            .settle_locked(addr(8), &[LockedMove::Pay(addr(9), Amount::new(21))], Amount::ZERO)
            .await
            .is_err());
        assert_eq!(manager.get_locked(addr(8)).await, Amount::new(20));
        assert_eq!(manager.get_balance(addr(9)).await, Amount::ZERO);
    }
}
