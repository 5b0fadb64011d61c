use agora_types::{Address, ManualClock};
use agora_vrf::{
    BeaconConfig, BeaconError, CommitRevealBeacon, RandomnessBeacon, SeedCommit, SeedReveal,
};
use std::sync::Arc;

#[tokio::test]
async fn rounds_chain_and_depend_on_every_reveal() {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = BeaconConfig {
        reveal_delay_secs: 5,
        reveal_window_secs: 5,
        genesis_seed: [7; 32],
    };
    let beacon = CommitRevealBeacon::new(config.clone(), clock.clone()).unwrap();
    let other = CommitRevealBeacon::new(config, clock.clone()).unwrap();

    let alice = Address::from_label("alice");
    let bob = Address::from_label("bob");

    for (service, bob_secret) in [(&beacon, [2u8; 32]), (&other, [3u8; 32])] {
        service
            .submit_commit(SeedCommit::new(1, alice, &[1; 32]))
            .await
            .unwrap();
        service
            .submit_commit(SeedCommit::new(1, bob, &bob_secret))
            .await
            .unwrap();
    }

    clock.advance(5);
    for (service, bob_secret) in [(&beacon, [2u8; 32]), (&other, [3u8; 32])] {
        service
            .submit_reveal(SeedReveal {
                round_id: 1,
                contributor: alice,
                secret: [1; 32],
            })
            .await
            .unwrap();
        service
            .submit_reveal(SeedReveal {
                round_id: 1,
                contributor: bob,
                secret: bob_secret,
            })
            .await
            .unwrap();
    }

    // A single differing secret changes the seed
    let seed_a = beacon.seed_for(1).await.unwrap();
    let seed_b = other.seed_for(1).await.unwrap();
    assert_ne!(seed_a, seed_b);

    // Reveals after finalization are refused
    let late = beacon
        .submit_reveal(SeedReveal {
            round_id: 1,
            contributor: alice,
            secret: [1; 32],
        })
        .await;
    assert_eq!(late, Err(BeaconError::RevealWindowClosed(1)));
}

#[tokio::test]
async fn unknown_round_has_no_seed() {
    let clock = Arc::new(ManualClock::new(0));
    let beacon = CommitRevealBeacon::new(BeaconConfig::default(), clock).unwrap();
    assert_eq!(beacon.seed_for(42).await, Err(BeaconError::UnknownRound(42)));
}
