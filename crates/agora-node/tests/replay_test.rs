use agora_jobs::JobStatus;
use agora_node::{BeaconKind, Metrics, ProtocolConfig, Scenario, ScenarioRunner};
use agora_types::{Address, Amount, JobId};
use agora_vrf::{DeterministicBeacon, RandomnessBeacon};
use std::path::PathBuf;

fn load(name: &str) -> Scenario {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name);
    Scenario::load(&path).unwrap()
}

fn happy_path() -> Scenario {
    load("happy_path.json")
}

fn runner_with(config: &ProtocolConfig, start: u64, metrics: Option<Metrics>) -> ScenarioRunner {
    ScenarioRunner::new(config.protocol_settings(), &config.beacon, start, metrics).unwrap()
}

fn runner(start: u64, metrics: Option<Metrics>) -> ScenarioRunner {
    runner_with(&ProtocolConfig::default(), start, metrics)
}

fn lines(out: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_happy_path_replay_settles_and_conserves() {
    let scenario = happy_path();
    let metrics = Metrics::new().unwrap();
    let mut runner = runner(scenario.start, Some(metrics.clone()));
    let mut out = Vec::new();

    println!("📝 Phase 1: replay");
    let summary = runner.replay(&scenario, false, &mut out).await.unwrap();
    assert_eq!(summary.steps, scenario.steps.len());
    assert_eq!(summary.failures, 0);
    assert!(summary.conserved());
    assert_eq!(summary.escrowed, Amount::ZERO);
    assert_eq!(summary.issued, Amount::new(1_400));

    println!("💰 Phase 2: balances");
    let protocol = runner.protocol();
    let job = protocol.jobs.get_job(JobId::new(1)).await.unwrap();
    assert_eq!(job.status, JobStatus::Finalized);
    assert_eq!(job.success, Some(true));
    let bob = Address::from_label("bob");
    assert_eq!(
        protocol.economics.balances.get_balance(bob).await,
        Amount::new(80 + 98)
    );
    assert_eq!(protocol.fee_pool.total().await, Amount::new(2));

    println!("📦 Phase 3: event stream");
    let records = lines(&out);
    assert_eq!(records.len(), summary.events);
    for (seq, record) in records.iter().enumerate() {
        assert_eq!(record["seq"], seq as u64);
    }
    let finalized: Vec<_> = records
        .iter()
        .filter(|r| r["event"] == "job_finalized")
        .collect();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0]["success"], true);
    assert_eq!(finalized[0]["fee"], 2);
    assert!(records.iter().all(|r| r.get("error").is_none()));

    let text = metrics.render().unwrap();
    assert!(text.contains("agora_jobs_created_total 1"));
    assert!(text.contains("agora_jobs_finalized_total 1"));
    assert!(text.contains("agora_scenario_step_failures_total 0"));
}

#[tokio::test]
async fn test_failing_step_stops_replay() {
    let scenario: Scenario = serde_json::from_str(
        r#"{
            "steps": [
                { "action": "fund", "who": "alice", "amount": 50 },
                { "action": "create_job", "employer": "alice", "reward": 100,
                  "deadline_in": 3600, "content": "too expensive" },
                { "action": "fund", "who": "alice", "amount": 50 }
            ]
        }"#,
    )
    .unwrap();

    let mut runner = runner(scenario.start, None);
    let mut out = Vec::new();
    let err = runner.replay(&scenario, false, &mut out).await.unwrap_err();
    assert!(err.to_string().contains("create_job"));

    let alice = Address::from_label("alice");
    let protocol = runner.protocol();
    assert_eq!(
        protocol.economics.balances.get_balance(alice).await,
        Amount::new(50)
    );
    assert!(protocol.jobs.events().is_empty().await);

    let records = lines(&out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["step"], 1);
    assert_eq!(records[0]["action"], "create_job");
}

#[tokio::test]
async fn test_keep_going_counts_failures() {
    let scenario: Scenario = serde_json::from_str(
        r#"{
            "steps": [
                { "action": "expire", "job": 9 },
                { "action": "fund", "who": "alice", "amount": 10 },
                { "action": "tally", "job": 9, "expect_error": "not found" },
                { "action": "fund", "who": "alice", "amount": 10, "expect_error": "anything" }
            ]
        }"#,
    )
    .unwrap();

    let mut runner = runner(scenario.start, None);
    let mut out = Vec::new();
    let summary = runner.replay(&scenario, true, &mut out).await.unwrap();

    // Unknown job, then a step that was expected to fail but did not
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.issued, Amount::new(20));
    assert!(summary.conserved());
    let records = lines(&out);
    let failed_steps: Vec<_> = records.iter().map(|r| r["step"].clone()).collect();
    assert_eq!(failed_steps, vec![serde_json::json!(0), serde_json::json!(3)]);
}

#[tokio::test]
async fn test_params_update_by_owner_only() {
    let scenario: Scenario = serde_json::from_str(
        r#"{
            "steps": [
                { "action": "update_params", "caller": "mallory", "expect_error": "Unauthorized",
                  "params": { "min_committee_size": 4, "max_committee_size": 6 } },
                { "action": "update_params",
                  "params": { "min_committee_size": 4, "max_committee_size": 6 } }
            ]
        }"#,
    )
    .unwrap();

    let mut runner = runner(scenario.start, None);
    let mut out = Vec::new();
    let summary = runner.replay(&scenario, false, &mut out).await.unwrap();
    assert_eq!(summary.failures, 0);

    let records = lines(&out);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["event"], "params_updated");
    assert_eq!(records[0]["version"], 1);

    let (version, current) = runner.protocol().engine.params().current().await;
    assert_eq!(version, 1);
    assert_eq!(current.min_committee_size, 4);
    assert_eq!(current.commit_window_secs, 3_600);
}

#[tokio::test]
async fn test_commit_reveal_beacon_seeds_committee() {
    let scenario = load("commit_reveal_beacon.json");
    let mut config = ProtocolConfig::default();
    config.beacon.kind = BeaconKind::CommitReveal;
    let metrics = Metrics::new().unwrap();
    let mut runner = runner_with(&config, scenario.start, Some(metrics.clone()));
    let mut out = Vec::new();

    println!("📝 Phase 1: replay with contributor secrets");
    let summary = runner.replay(&scenario, false, &mut out).await.unwrap();
    assert_eq!(summary.failures, 0);
    assert!(summary.conserved());

    println!("🎲 Phase 2: beacon round");
    let beacon = runner.seed_beacon().unwrap();
    let state = beacon.get_state(1).await.unwrap();
    assert_eq!(state.commits.len(), 2);
    assert_eq!(state.reveals.len(), 2);
    let seed = state.seed.unwrap();
    // Not the seed a label-derived beacon would have handed out in advance
    let predictable = DeterministicBeacon::from_label(&config.beacon.label)
        .seed_for(1)
        .await
        .unwrap();
    assert_ne!(seed, predictable);

    println!("💰 Phase 3: settlement");
    let protocol = runner.protocol();
    let job = protocol.jobs.get_job(JobId::new(1)).await.unwrap();
    assert_eq!(job.status, JobStatus::Finalized);
    assert_eq!(job.success, Some(true));
    let round = protocol.engine.get_round(JobId::new(1)).await.unwrap();
    assert_eq!(round.committee.len(), 3);
    assert_eq!(
        protocol
            .economics
            .balances
            .get_balance(Address::from_label("bob"))
            .await,
        Amount::new(80 + 98)
    );

    let records = lines(&out);
    assert_eq!(
        records
            .iter()
            .filter(|r| r["event"] == "committee_selected")
            .count(),
        1
    );
    let text = metrics.render().unwrap();
    assert!(text.contains("agora_beacon_commits_total 2"));
    assert!(text.contains("agora_beacon_reveals_total 2"));
    assert!(text.contains("agora_beacon_finalizations_total 1"));
}
