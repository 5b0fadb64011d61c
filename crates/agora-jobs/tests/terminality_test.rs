mod common;

use agora_consensus::{compute_commitment, RoundOutcome, Vote};
use agora_jobs::*;
use agora_types::{Amount, JobId, Role};
use common::*;
use proptest::prelude::*;

/// Every mutating operation must bounce off a terminal job without moving funds
async fn assert_all_rejected(w: &World, job_id: JobId) {
    let before_employer = w.balance(w.employer).await;
    let before_agent = w.balance(w.agent).await;
    let before_log = w.jobs().events().len().await;
    let status = w.jobs().get_job(job_id).await.unwrap().status;
    assert!(status.is_terminal());

    let v = w.validators[0];
    let results: Vec<(&str, Result<()>)> = vec![
        (
            "apply",
            w.jobs().apply_for_job(job_id, w.agent, b"").await.map(|_| ()),
        ),
        (
            "submit",
            w.jobs().submit_result(job_id, w.agent, [1; 32]).await.map(|_| ()),
        ),
        (
            "commit",
            w.jobs().commit_vote(job_id, v, [0; 32]).await.map(|_| ()),
        ),
        (
            "reveal",
            w.jobs()
                .reveal_vote(job_id, v, Vote::Approve, salt(0))
                .await
                .map(|_| ()),
        ),
        ("tally", w.jobs().tally_round(job_id).await.map(|_| ())),
        ("finalize", w.jobs().finalize_job(job_id).await.map(|_| ())),
        (
            "force_finalize",
            w.jobs().force_finalize(job_id, w.owner).await.map(|_| ()),
        ),
        (
            "dispute",
            w.jobs()
                .raise_dispute(job_id, w.employer, [2; 32])
                .await
                .map(|_| ()),
        ),
        (
            "resolve",
            w.jobs()
                .resolve_dispute(job_id, w.moderator, true)
                .await
                .map(|_| ()),
        ),
        ("cancel", w.jobs().cancel_job(job_id, w.employer).await.map(|_| ())),
        ("expire", w.jobs().expire_job(job_id).await.map(|_| ())),
    ];

    for (operation, result) in results {
        assert!(
            matches!(result, Err(JobError::InvalidStatus { .. })),
            "{} on a {:?} job returned {:?}",
            operation,
            status,
            result
        );
    }
    assert_eq!(w.jobs().get_job(job_id).await.unwrap().status, status);
    assert_eq!(w.balance(w.employer).await, before_employer);
    assert_eq!(w.balance(w.agent).await, before_agent);
    assert_eq!(w.jobs().events().len().await, before_log);
}

#[tokio::test]
async fn test_finalized_job_is_final() {
    let w = world(settings(0)).await;
    let (job_id, committee) = w.submitted_job().await;
    w.vote(job_id, &committee, &[Vote::Approve, Vote::Approve, Vote::Approve])
        .await;
    assert_all_rejected(&w, job_id).await;
}

#[tokio::test]
async fn test_cancelled_job_is_final() {
    let w = world(settings(0)).await;
    let job_id = w.standard_job().await;
    w.jobs().cancel_job(job_id, w.employer).await.unwrap();
    assert_all_rejected(&w, job_id).await;
}

#[tokio::test]
async fn test_expired_job_is_final() {
    let w = world(settings(0)).await;
    let job_id = w.standard_job().await;
    w.clock.advance(WEEK + 1);
    w.jobs().expire_job(job_id).await.unwrap();
    assert_all_rejected(&w, job_id).await;
}

#[tokio::test]
async fn test_dispute_resolved_job_is_final() {
    let w = world(settings(86_400)).await;
    let (job_id, _) = w.submitted_job().await;
    w.jobs()
        .raise_dispute(job_id, w.employer, [8; 32])
        .await
        .unwrap();
    w.jobs()
        .resolve_dispute(job_id, w.moderator, false)
        .await
        .unwrap();
    assert_all_rejected(&w, job_id).await;
}

fn ballot() -> impl Strategy<Value = Option<Vote>> {
    prop_oneof![
        Just(None),
        Just(Some(Vote::Approve)),
        Just(Some(Vote::Reject)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any mix of approvals, rejections and absences ends in a terminal job
    /// with every unit of value accounted for and no stake left locked
    #[test]
    fn any_ballot_settles_and_conserves(ballots in prop::collection::vec(ballot(), 3)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let w = world(settings(0)).await;
            let (job_id, committee) = w.submitted_job().await;

            let voters: Vec<_> = committee
                .iter()
                .zip(&ballots)
                .enumerate()
                .filter_map(|(i, (v, b))| b.map(|vote| (i, *v, vote)))
                .collect();
            for (i, v, vote) in &voters {
                let commitment = compute_commitment(*vote, &salt(*i), v, job_id);
                w.jobs().commit_vote(job_id, *v, commitment).await.unwrap();
            }
            w.clock.advance(WINDOW);
            for (i, v, vote) in &voters {
                w.jobs().reveal_vote(job_id, *v, *vote, salt(*i)).await.unwrap();
            }

            if voters.len() < committee.len() {
                w.clock.advance(WINDOW);
                let outcome = w.jobs().tally_round(job_id).await.unwrap().value;
                if outcome == RoundOutcome::QuorumNotReached {
                    prop_assert!(voters.is_empty());
                    w.jobs().force_finalize(job_id, w.owner).await.unwrap();
                }
            }

            let job = w.jobs().get_job(job_id).await.unwrap();
            prop_assert_eq!(job.status, JobStatus::Finalized);
            let approvals = voters.iter().filter(|(_, _, v)| *v == Vote::Approve).count();
            if !voters.is_empty() {
                // 60% threshold over revealed votes
                let expected = approvals * 10_000 >= 6_000 * voters.len();
                prop_assert_eq!(job.success, Some(expected));
            }

            for v in &committee {
                let account = w.protocol.economics.stakes.get_account(*v, Role::Validator).await;
                prop_assert_eq!(account.locked, Amount::ZERO);
            }
            let agent_stake = w.protocol.economics.stakes.get_account(w.agent, Role::Agent).await;
            prop_assert_eq!(agent_stake.locked, Amount::ZERO);

            w.assert_conserved().await;
            assert_all_rejected(&w, job_id).await;
            Ok(())
        })?;
    }
}
