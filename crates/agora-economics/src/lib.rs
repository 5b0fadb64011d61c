pub mod balance;
pub mod error;
pub mod escrow;
pub mod roles;
pub mod slashing;
pub mod stake;

pub use balance::{AccountInfo, BalanceManager, SupplyTotals};
pub use error::{LedgerError, Result};
pub use escrow::{EscrowKind, EscrowManager, EscrowSettlement, LockId, LockMetadata, Payee, Payout};
pub use roles::{RoleParams, RoleTable};
pub use slashing::{SlashShares, SlashSplit};
pub use stake::{LedgerConfig, SlashReceipt, StakeAccount, StakeLedger};

use agora_types::Amount;
use std::sync::Arc;

/// Balance book, escrow and stake ledger sharing one set of balances
pub struct EconomicsEngine {
    pub balances: Arc<BalanceManager>,
    pub escrow: Arc<EscrowManager>,
    pub stakes: Arc<StakeLedger>,
}

impl EconomicsEngine {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let balances = Arc::new(BalanceManager::new());
        let escrow = Arc::new(EscrowManager::new(balances.clone()));
        let stakes = Arc::new(StakeLedger::new(config, balances.clone())?);
        Ok(Self {
            balances,
            escrow,
            stakes,
        })
    }

    /// Build from an already configured stake ledger (e.g. one with metrics set)
    pub fn with_stake_ledger(stakes: StakeLedger) -> Self {
        let balances = stakes.balances().clone();
        let escrow = Arc::new(EscrowManager::new(balances.clone()));
        Self {
            balances,
            escrow,
            stakes: Arc::new(stakes),
        }
    }

    /// Value still held inside the ledger: balances (escrow included) plus stake
    pub async fn internal_supply(&self) -> Result<Amount> {
        let balances = self.balances.total_balances().await?;
        let staked = self.stakes.total_staked().await?;
        balances
            .checked_add(staked)
            .ok_or_else(|| LedgerError::Overflow("internal supply".to_string()))
    }
}
