use agora_types::{Address, Hash, JobId};
use agora_vrf::compute_challenge;

const COMMITTEE_DOMAIN: &str = "agora-committee";

/// Selection score of a candidate for a job; lower wins
pub fn selection_score(seed: &Hash, job_id: JobId, candidate: &Address) -> Hash {
    compute_challenge(
        seed,
        COMMITTEE_DOMAIN,
        &[&job_id.to_be_bytes(), candidate.as_bytes()],
    )
}

/// Draw up to `size` members, ordered by ascending score. Mixing the job id into
/// every score keeps one seed from fixing the same committee for all jobs.
pub fn select_committee(seed: &Hash, job_id: JobId, candidates: &[Address], size: usize) -> Vec<Address> {
    let mut scored: Vec<(Hash, Address)> = candidates
        .iter()
        .map(|c| (selection_score(seed, job_id, c), *c))
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(size).map(|(_, a)| a).collect()
}
