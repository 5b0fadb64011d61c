use crate::{BalanceManager, LedgerError, Result, RoleParams, RoleTable, SlashShares, SlashSplit};
use agora_types::{Address, Amount, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Stake ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Receives the treasury share of every slash
    pub treasury: Address,
    pub slash_split: SlashSplit,
    pub roles: RoleTable,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            treasury: Address::from_label("agora-treasury"),
            slash_split: SlashSplit::default(),
            roles: RoleTable::default(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        self.slash_split.validate()
    }
}

/// Collateral deposited by one participant for one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    pub total: Amount,
    pub locked: Amount,
}

impl StakeAccount {
    pub fn available(&self) -> Amount {
        self.total.saturating_sub(self.locked)
    }
}

/// Outcome of one slash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashReceipt {
    pub participant: Address,
    pub role: Role,
    pub beneficiary: Address,
    pub amount: Amount,
    pub shares: SlashShares,
}

type StakeKey = (Address, Role);

/// Collateral per (participant, role). All locking and slashing goes through
/// here; callers never touch stake accounts directly.
pub struct StakeLedger {
    config: LedgerConfig,
    balances: Arc<BalanceManager>,
    accounts: Arc<RwLock<HashMap<StakeKey, StakeAccount>>>,

    // Metrics
    pub stake_locks_total: Option<Arc<prometheus::IntCounter>>,
    pub slashes_total: Option<Arc<prometheus::IntCounter>>,
    pub slashed_amount_total: Option<Arc<prometheus::IntCounter>>,
}

impl StakeLedger {
    pub fn new(config: LedgerConfig, balances: Arc<BalanceManager>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            balances,
            accounts: Arc::new(RwLock::new(HashMap::new())),
            stake_locks_total: None,
            slashes_total: None,
            slashed_amount_total: None,
        })
    }

    /// Set metrics for stake tracking
    pub fn set_metrics(
        &mut self,
        stake_locks_total: Arc<prometheus::IntCounter>,
        slashes_total: Arc<prometheus::IntCounter>,
        slashed_amount_total: Arc<prometheus::IntCounter>,
    ) {
        self.stake_locks_total = Some(stake_locks_total);
        self.slashes_total = Some(slashes_total);
        self.slashed_amount_total = Some(slashed_amount_total);
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn role_params(&self, role: Role) -> &RoleParams {
        self.config.roles.get(role)
    }

    pub fn balances(&self) -> &Arc<BalanceManager> {
        &self.balances
    }

    pub async fn get_account(&self, participant: Address, role: Role) -> StakeAccount {
        let accounts = self.accounts.read().await;
        accounts
            .get(&(participant, role))
            .copied()
            .unwrap_or_default()
    }

    pub async fn available(&self, participant: Address, role: Role) -> Amount {
        self.get_account(participant, role).await.available()
    }

    /// Sum of all deposited stake across participants and roles
    pub async fn total_staked(&self) -> Result<Amount> {
        let accounts = self.accounts.read().await;
        Ok(Amount::sum(accounts.values().map(|a| &a.total))?)
    }

    /// Move `amount` from the participant's available balance into stake
    pub async fn deposit_stake(&self, participant: Address, role: Role, amount: Amount) -> Result<StakeAccount> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidParameters(
                "stake deposit must be positive".to_string(),
            ));
        }
        let mut accounts = self.accounts.write().await;
        let current = accounts
            .get(&(participant, role))
            .copied()
            .unwrap_or_default();
        let total = current
            .total
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("stake total".to_string()))?;

        self.balances.debit(participant, amount).await?;
        let account = accounts.entry((participant, role)).or_default();
        account.total = total;
        let account = *account;

        info!(
            participant = %participant.short(),
            role = %role,
            amount = amount.as_u64(),
            total = account.total.as_u64(),
            locked = account.locked.as_u64(),
            "🏦 Stake deposited"
        );
        Ok(account)
    }

    /// Return available stake to the participant's balance
    pub async fn withdraw_stake(&self, participant: Address, role: Role, amount: Amount) -> Result<StakeAccount> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidParameters(
                "stake withdrawal must be positive".to_string(),
            ));
        }
        let mut accounts = self.accounts.write().await;
        let current = accounts
            .get(&(participant, role))
            .copied()
            .unwrap_or_default();
        let available = current.available();
        if available < amount {
            return Err(LedgerError::StakeCurrentlyLocked {
                available,
                requested: amount,
            });
        }

        self.balances.credit_many(&[(participant, amount)]).await?;
        let account = accounts.entry((participant, role)).or_default();
        account.total = account.total.saturating_sub(amount);
        let account = *account;

        info!(
            participant = %participant.short(),
            role = %role,
            amount = amount.as_u64(),
            total = account.total.as_u64(),
            "🏧 Stake withdrawn"
        );
        Ok(account)
    }

    pub async fn lock_stake(&self, participant: Address, role: Role, amount: Amount) -> Result<()> {
        self.lock_batch(&[(participant, role, amount)]).await
    }

    /// Lock several stakes in one critical section. Either every entry is
    /// locked or none is.
    pub async fn lock_batch(&self, entries: &[(Address, Role, Amount)]) -> Result<()> {
        if entries.iter().any(|(_, _, amount)| amount.is_zero()) {
            return Err(LedgerError::InvalidParameters(
                "stake lock must be positive".to_string(),
            ));
        }
        let mut accounts = self.accounts.write().await;

        // Aggregate first so a participant listed twice is checked against the sum
        let mut requested: HashMap<StakeKey, Amount> = HashMap::new();
        for (participant, role, amount) in entries {
            let entry = requested.entry((*participant, *role)).or_default();
            *entry = entry
                .checked_add(*amount)
                .ok_or_else(|| LedgerError::Overflow("stake lock".to_string()))?;
        }
        for (key, amount) in &requested {
            let available = accounts.get(key).map(|a| a.available()).unwrap_or_default();
            if available < *amount {
                return Err(LedgerError::InsufficientStake {
                    available,
                    required: *amount,
                });
            }
        }

        for (key, amount) in requested {
            let account = accounts.entry(key).or_default();
            account.locked = account.locked.saturating_add(amount);
            debug!(
                participant = %key.0.short(),
                role = %key.1,
                amount = amount.as_u64(),
                locked = account.locked.as_u64(),
                total = account.total.as_u64(),
                "🔒 Stake locked"
            );
            if let Some(ref counter) = self.stake_locks_total {
                counter.inc();
            }
        }
        Ok(())
    }

    /// Release a previously locked amount back to available
    pub async fn unlock_stake(&self, participant: Address, role: Role, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry((participant, role)).or_default();
        if account.locked < amount {
            return Err(LedgerError::LockedStakeTooSmall {
                participant,
                role,
                locked: account.locked,
                requested: amount,
            });
        }
        account.locked = account.locked.saturating_sub(amount);

        debug!(
            participant = %participant.short(),
            role = %role,
            amount = amount.as_u64(),
            locked = account.locked.as_u64(),
            "🔓 Stake unlocked"
        );
        Ok(())
    }

    /// Forfeit `amount` of locked stake: the beneficiary and the treasury are
    /// credited their shares and the rest is burned.
    pub async fn slash(
        &self,
        participant: Address,
        role: Role,
        amount: Amount,
        beneficiary: Address,
    ) -> Result<SlashReceipt> {
        let shares = self.config.slash_split.apply(amount);
        let receipt = SlashReceipt {
            participant,
            role,
            beneficiary,
            amount,
            shares,
        };
        if amount.is_zero() {
            return Ok(receipt);
        }

        let mut accounts = self.accounts.write().await;
        let current = accounts
            .get(&(participant, role))
            .copied()
            .unwrap_or_default();
        if current.locked < amount {
            return Err(LedgerError::LockedStakeTooSmall {
                participant,
                role,
                locked: current.locked,
                requested: amount,
            });
        }

        self.balances
            .credit_many(&[
                (beneficiary, shares.beneficiary),
                (self.config.treasury, shares.treasury),
            ])
            .await?;
        self.balances.record_burn(shares.burn).await;

        let account = accounts.entry((participant, role)).or_default();
        account.locked = account.locked.saturating_sub(amount);
        account.total = account.total.saturating_sub(amount);

        if let Some(ref counter) = self.slashes_total {
            counter.inc();
        }
        if let Some(ref counter) = self.slashed_amount_total {
            counter.inc_by(amount.as_u64());
        }

        warn!(
            participant = %participant.short(),
            role = %role,
            amount = amount.as_u64(),
            beneficiary = %beneficiary.short(),
            beneficiary_share = shares.beneficiary.as_u64(),
            treasury_share = shares.treasury.as_u64(),
            burned = shares.burn.as_u64(),
            remaining_total = account.total.as_u64(),
            "⚔️ Stake slashed"
        );
        Ok(receipt)
    }
}
