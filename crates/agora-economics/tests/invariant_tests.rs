use agora_economics::{BalanceManager, EconomicsEngine, LedgerConfig, SlashSplit, StakeLedger};
use agora_types::{Address, Amount, BasisPoints, Role};
use proptest::prelude::*;
use std::sync::Arc;

fn participant(i: u8) -> Address {
    Address::from_bytes([i + 1; 32])
}

#[derive(Debug, Clone)]
enum StakeOp {
    Deposit(u8, u64),
    Withdraw(u8, u64),
    Lock(u8, u64),
    Unlock(u8, u64),
    Slash(u8, u64),
}

fn stake_op() -> impl Strategy<Value = StakeOp> {
    prop_oneof![
        (0u8..3, 0u64..60).prop_map(|(p, a)| StakeOp::Deposit(p, a)),
        (0u8..3, 0u64..60).prop_map(|(p, a)| StakeOp::Withdraw(p, a)),
        (0u8..3, 0u64..60).prop_map(|(p, a)| StakeOp::Lock(p, a)),
        (0u8..3, 0u64..60).prop_map(|(p, a)| StakeOp::Unlock(p, a)),
        (0u8..3, 0u64..60).prop_map(|(p, a)| StakeOp::Slash(p, a)),
    ]
}

prop_compose! {
    fn valid_split()(b in 0u16..=10_000)(b in Just(b), t in 0u16..=(10_000 - b)) -> SlashSplit {
        SlashSplit::new(
            BasisPoints::new(b).unwrap(),
            BasisPoints::new(t).unwrap(),
            BasisPoints::new(10_000 - b - t).unwrap(),
        )
        .unwrap()
    }
}

proptest! {
    #[test]
    fn slash_shares_always_sum_to_amount(split in valid_split(), amount in 0u64..u64::MAX / 2) {
        let shares = split.apply(Amount::new(amount));
        prop_assert_eq!(shares.total(), Amount::new(amount));
        prop_assert!(shares.beneficiary <= Amount::new(amount));
        prop_assert!(shares.treasury <= Amount::new(amount));
    }

    #[test]
    fn stake_never_overlocked_and_value_conserved(ops in prop::collection::vec(stake_op(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let engine = EconomicsEngine::new(LedgerConfig::default()).unwrap();
            for i in 0..3 {
                engine.balances.mint(participant(i), Amount::new(200)).await.unwrap();
            }
            let employer = Address::from_label("employer");

            for op in ops {
                // Failures are expected; the invariants must hold either way
                let _ = match op {
                    StakeOp::Deposit(p, a) => engine.stakes.deposit_stake(participant(p), Role::Validator, Amount::new(a)).await.map(|_| ()),
                    StakeOp::Withdraw(p, a) => engine.stakes.withdraw_stake(participant(p), Role::Validator, Amount::new(a)).await.map(|_| ()),
                    StakeOp::Lock(p, a) => engine.stakes.lock_stake(participant(p), Role::Validator, Amount::new(a)).await,
                    StakeOp::Unlock(p, a) => engine.stakes.unlock_stake(participant(p), Role::Validator, Amount::new(a)).await,
                    StakeOp::Slash(p, a) => engine.stakes.slash(participant(p), Role::Validator, Amount::new(a), employer).await.map(|_| ()),
                };

                for i in 0..3 {
                    let account = engine.stakes.get_account(participant(i), Role::Validator).await;
                    assert!(account.locked <= account.total);
                }
                let totals = engine.balances.totals().await;
                let inside = engine.internal_supply().await.unwrap();
                assert_eq!(
                    inside.as_u64() + totals.exported.as_u64() + totals.burned.as_u64(),
                    totals.issued.as_u64()
                );
            }
        });
    }
}

#[tokio::test]
async fn failed_batch_lock_changes_nothing() {
    let balances = Arc::new(BalanceManager::new());
    let ledger = StakeLedger::new(LedgerConfig::default(), balances.clone()).unwrap();
    let (a, b) = (participant(0), participant(1));
    balances.mint(a, Amount::new(30)).await.unwrap();
    balances.mint(b, Amount::new(30)).await.unwrap();
    ledger.deposit_stake(a, Role::Validator, Amount::new(30)).await.unwrap();
    ledger.deposit_stake(b, Role::Validator, Amount::new(30)).await.unwrap();

    // Same participant twice exceeds their stake in aggregate
    let result = ledger
        .lock_batch(&[
            (a, Role::Validator, Amount::new(10)),
            (b, Role::Validator, Amount::new(20)),
            (b, Role::Validator, Amount::new(20)),
        ])
        .await;
    assert!(result.is_err());
    assert_eq!(ledger.get_account(a, Role::Validator).await.locked, Amount::ZERO);
    assert_eq!(ledger.get_account(b, Role::Validator).await.locked, Amount::ZERO);
}
