use crate::{DisputeConfig, JobError, Result};
use agora_economics::{EscrowKind, EscrowManager, LockId, Payout};
use agora_types::{Address, Amount, Hash, JobId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Raised,
    Resolved { employer_wins: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub job_id: JobId,
    pub raised_by: Address,
    pub evidence_hash: Hash,
    pub bond: Amount,
    /// `None` when the configured bond is zero
    pub bond_lock: Option<LockId>,
    pub moderator: Address,
    pub raised_at: Timestamp,
    pub status: DisputeStatus,
    pub resolved_at: Option<Timestamp>,
}

impl Dispute {
    pub fn is_open(&self) -> bool {
        self.status == DisputeStatus::Raised
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeResolution {
    pub dispute: Dispute,
    /// Who ended up with the bond; the raiser when they prevailed
    pub bond_recipient: Option<Address>,
}

/// Holds dispute records and their appeal bonds. Records are kept after
/// resolution.
pub struct DisputeManager {
    config: DisputeConfig,
    escrow: Arc<EscrowManager>,
    disputes: Arc<RwLock<HashMap<JobId, Dispute>>>,
}

impl DisputeManager {
    pub fn new(config: DisputeConfig, escrow: Arc<EscrowManager>) -> Self {
        Self {
            config,
            escrow,
            disputes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &DisputeConfig {
        &self.config
    }

    pub async fn get(&self, job_id: JobId) -> Option<Dispute> {
        self.disputes.read().await.get(&job_id).cloned()
    }

    /// Only the configured moderator may resolve
    pub fn authorize(&self, caller: Address) -> Result<()> {
        if caller != self.config.moderator {
            return Err(JobError::Unauthorized(format!(
                "{} is not the dispute moderator",
                caller.short()
            )));
        }
        Ok(())
    }

    /// Record a dispute and lock the raiser's appeal bond
    pub async fn raise(
        &self,
        job_id: JobId,
        raised_by: Address,
        evidence_hash: Hash,
        now: Timestamp,
    ) -> Result<Dispute> {
        let mut disputes = self.disputes.write().await;
        if disputes.contains_key(&job_id) {
            return Err(JobError::InvalidParameters(format!(
                "a dispute was already raised for {}",
                job_id
            )));
        }

        let bond = self.config.appeal_bond;
        let bond_lock = if bond.is_zero() {
            None
        } else {
            let kind = EscrowKind::AppealBond {
                job_id,
                raiser: raised_by,
            };
            Some(self.escrow.lock(kind, bond, now).await?)
        };

        let dispute = Dispute {
            job_id,
            raised_by,
            evidence_hash,
            bond,
            bond_lock,
            moderator: self.config.moderator,
            raised_at: now,
            status: DisputeStatus::Raised,
            resolved_at: None,
        };
        disputes.insert(job_id, dispute.clone());

        info!(
            job_id = %job_id,
            raised_by = %raised_by.short(),
            bond = bond.as_u64(),
            evidence = hex::encode(&evidence_hash[..8]),
            "🚩 Dispute raised"
        );
        Ok(dispute)
    }

    /// Close the dispute and settle the bond: back to the raiser if they
    /// prevailed, otherwise to the counterparty.
    pub async fn resolve(
        &self,
        job_id: JobId,
        employer: Address,
        agent: Address,
        employer_wins: bool,
        now: Timestamp,
    ) -> Result<DisputeResolution> {
        let mut disputes = self.disputes.write().await;
        let dispute = disputes
            .get_mut(&job_id)
            .ok_or(JobError::DisputeNotFound(job_id))?;
        if !dispute.is_open() {
            return Err(JobError::InvalidParameters(format!(
                "dispute for {} is already resolved",
                job_id
            )));
        }

        let raiser_prevails = (dispute.raised_by == employer) == employer_wins;
        let bond_recipient = match &dispute.bond_lock {
            None => None,
            Some(lock_id) if raiser_prevails => {
                self.escrow.refund(lock_id).await?;
                Some(dispute.raised_by)
            }
            Some(lock_id) => {
                let winner = if dispute.raised_by == employer {
                    agent
                } else {
                    employer
                };
                self.escrow
                    .settle(lock_id, &[Payout::to(winner, dispute.bond)])
                    .await?;
                Some(winner)
            }
        };

        dispute.status = DisputeStatus::Resolved { employer_wins };
        dispute.resolved_at = Some(now);

        info!(
            job_id = %job_id,
            employer_wins,
            raiser_prevails,
            bond = dispute.bond.as_u64(),
            bond_recipient = ?bond_recipient.map(|a| a.short()),
            "⚖️ Dispute resolved"
        );
        Ok(DisputeResolution {
            dispute: dispute.clone(),
            bond_recipient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_economics::BalanceManager;

    async fn setup() -> (DisputeManager, Arc<BalanceManager>, Address, Address) {
        let balances = Arc::new(BalanceManager::new());
        let escrow = Arc::new(EscrowManager::new(balances.clone()));
        let employer = Address::from_label("employer");
        let agent = Address::from_label("agent");
        balances.mint(employer, Amount::new(50)).await.unwrap();
        balances.mint(agent, Amount::new(50)).await.unwrap();
        (
            DisputeManager::new(DisputeConfig::default(), escrow),
            balances,
            employer,
            agent,
        )
    }

    #[tokio::test]
    async fn test_losing_raiser_forfeits_bond() {
        let (disputes, balances, employer, agent) = setup().await;
        let job = JobId::new(1);
        disputes.raise(job, agent, [1; 32], 10).await.unwrap();
        assert_eq!(balances.get_available(agent).await, Amount::new(40));

        let resolution = disputes
            .resolve(job, employer, agent, true, 20)
            .await
            .unwrap();
        assert_eq!(resolution.bond_recipient, Some(employer));
        assert_eq!(balances.get_balance(agent).await, Amount::new(40));
        assert_eq!(balances.get_balance(employer).await, Amount::new(60));
        assert_eq!(
            disputes.get(job).await.unwrap().status,
            DisputeStatus::Resolved { employer_wins: true }
        );
    }

    #[tokio::test]
    async fn test_prevailing_raiser_gets_bond_back() {
        let (disputes, balances, employer, agent) = setup().await;
        let job = JobId::new(2);
        disputes.raise(job, employer, [2; 32], 10).await.unwrap();
        let resolution = disputes
            .resolve(job, employer, agent, true, 20)
            .await
            .unwrap();
        assert_eq!(resolution.bond_recipient, Some(employer));
        assert_eq!(balances.get_available(employer).await, Amount::new(50));
    }

    #[tokio::test]
    async fn test_bond_requires_balance() {
        let (disputes, _, _, _) = setup().await;
        let broke = Address::from_label("broke");
        assert!(matches!(
            disputes.raise(JobId::new(3), broke, [0; 32], 10).await,
            Err(JobError::Ledger(_))
        ));
        assert!(disputes.get(JobId::new(3)).await.is_none());
    }

    #[test]
    fn test_only_moderator_authorized() {
        let balances = Arc::new(BalanceManager::new());
        let disputes =
            DisputeManager::new(DisputeConfig::default(), Arc::new(EscrowManager::new(balances)));
        assert!(disputes.authorize(Address::from_label("agora-moderator")).is_ok());
        assert!(matches!(
            disputes.authorize(Address::from_label("someone")),
            Err(JobError::Unauthorized(_))
        ));
    }
}
