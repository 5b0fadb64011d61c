use crate::SeedReveal;
use agora_types::{hash_parts, Hash};

/// Seed for a round: H(prev_seed || XOR of H(secret) over every reveal).
/// XOR makes the result independent of reveal order.
pub fn compute_round_seed(round_id: u64, prev_seed: &Hash, reveals: &[SeedReveal]) -> Hash {
    let mut combined = [0u8; 32];
    for reveal in reveals.iter().filter(|r| r.round_id == round_id) {
        let h = blake3::hash(&reveal.secret);
        for (acc, byte) in combined.iter_mut().zip(h.as_bytes()) {
            *acc ^= byte;
        }
    }
    hash_parts(&[prev_seed, &combined, &round_id.to_be_bytes()])
}

/// Domain-separated derivation from a seed
pub fn compute_challenge(seed: &Hash, domain: &str, params: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(&[0]);
    hasher.update(seed);
    for param in params {
        hasher.update(param);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::Address;

    fn reveal(round_id: u64, b: u8) -> SeedReveal {
        SeedReveal {
            round_id,
            contributor: Address::from_bytes([b; 32]),
            secret: [b; 32],
        }
    }

    #[test]
    fn seed_is_order_independent() {
        let a = compute_round_seed(5, &[0; 32], &[reveal(5, 1), reveal(5, 2)]);
        let b = compute_round_seed(5, &[0; 32], &[reveal(5, 2), reveal(5, 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn seed_ignores_other_rounds() {
        let a = compute_round_seed(5, &[0; 32], &[reveal(5, 1)]);
        let b = compute_round_seed(5, &[0; 32], &[reveal(5, 1), reveal(6, 9)]);
        assert_eq!(a, b);
    }

    #[test]
    fn challenge_is_domain_separated() {
        let seed = [3u8; 32];
        assert_ne!(
            compute_challenge(&seed, "committee", &[]),
            compute_challenge(&seed, "other", &[])
        );
    }
}
