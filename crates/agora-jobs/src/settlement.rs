//! Reward arithmetic. Every plan distributes exactly the escrowed reward.

use agora_types::{Address, Amount, BasisPoints};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPlan {
    pub fee: Amount,
    pub agent_payout: Amount,
    pub validator_pool: Amount,
    pub validator_shares: Vec<(Address, Amount)>,
    pub employer_refund: Amount,
}

impl PayoutPlan {
    pub fn total(&self) -> Amount {
        self.fee
            .saturating_add(self.agent_payout)
            .saturating_add(self.validator_pool)
            .saturating_add(self.employer_refund)
    }
}

/// Even split; the remainder goes to the first recipient
pub fn split_pool(pool: Amount, recipients: &[Address]) -> Vec<(Address, Amount)> {
    let (share, remainder) = pool.split_even(recipients.len());
    recipients
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let amount = if i == 0 {
                share.saturating_add(remainder)
            } else {
                share
            };
            (*r, amount)
        })
        .collect()
}

/// fee = reward*fee_bps; net = reward - fee; agent gets net*share; validators the rest.
/// With nobody to reward, the validator pool goes to the agent.
pub fn plan_success(
    reward: Amount,
    fee_bps: BasisPoints,
    agent_share_bps: BasisPoints,
    rewarded: &[Address],
) -> PayoutPlan {
    let fee = reward.mul_bps(fee_bps);
    let net = reward.saturating_sub(fee);
    let mut agent_payout = net.mul_bps(agent_share_bps);
    let mut validator_pool = net.saturating_sub(agent_payout);
    if rewarded.is_empty() {
        agent_payout = agent_payout.saturating_add(validator_pool);
        validator_pool = Amount::ZERO;
    }
    let plan = PayoutPlan {
        fee,
        agent_payout,
        validator_shares: split_pool(validator_pool, rewarded),
        validator_pool,
        employer_refund: Amount::ZERO,
    };
    debug_assert_eq!(plan.total(), reward);
    plan
}

/// No fee on failure. Validators are paid from the full reward at the same
/// ratio and the employer gets the rest back.
pub fn plan_failure(reward: Amount, agent_share_bps: BasisPoints, rewarded: &[Address]) -> PayoutPlan {
    let validator_pool = if rewarded.is_empty() {
        Amount::ZERO
    } else {
        reward.saturating_sub(reward.mul_bps(agent_share_bps))
    };
    let plan = PayoutPlan {
        fee: Amount::ZERO,
        agent_payout: Amount::ZERO,
        validator_shares: split_pool(validator_pool, rewarded),
        validator_pool,
        employer_refund: reward.saturating_sub(validator_pool),
    };
    debug_assert_eq!(plan.total(), reward);
    plan
}
