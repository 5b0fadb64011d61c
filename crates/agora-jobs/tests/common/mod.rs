#![allow(dead_code)]

use agora_consensus::{compute_commitment, ConsensusParams, Vote};
use agora_jobs::*;
use agora_types::{Address, Amount, JobId, ManualClock, Role};
use agora_vrf::DeterministicBeacon;
use std::sync::Arc;

pub const START: u64 = 1_000_000;
pub const WEEK: u64 = 7 * 24 * 3600;
pub const WINDOW: u64 = 3_600;

pub struct World {
    pub protocol: Protocol,
    pub clock: Arc<ManualClock>,
    pub employer: Address,
    pub agent: Address,
    pub validators: Vec<Address>,
    pub owner: Address,
    pub moderator: Address,
}

impl World {
    pub fn jobs(&self) -> &JobManager {
        &self.protocol.jobs
    }

    pub async fn balance(&self, address: Address) -> Amount {
        self.protocol.economics.balances.get_balance(address).await
    }

    pub async fn issued(&self) -> Amount {
        self.protocol.economics.balances.totals().await.issued
    }

    pub async fn assert_conserved(&self) {
        assert_eq!(
            self.protocol.accounted_supply().await.unwrap(),
            self.issued().await,
            "value created or destroyed outside the ledger"
        );
        assert_eq!(self.protocol.economics.escrow.total_escrowed().await, Amount::ZERO);
    }

    /// reward 100, agent stake 20, deadline one week out, agent keeps the
    /// whole net reward
    pub async fn standard_job(&self) -> JobId {
        let request = NewJob::new(
            self.employer,
            Amount::new(100),
            START + WEEK,
            [7; 32],
        )
        .with_agent_stake(Amount::new(20))
        .with_agent_share(agora_types::BasisPoints::FULL);
        self.jobs().create_job(request).await.unwrap().value.id
    }

    /// Create, apply and submit; returns the job and its committee
    pub async fn submitted_job(&self) -> (JobId, Vec<Address>) {
        let job_id = self.standard_job().await;
        self.jobs()
            .apply_for_job(job_id, self.agent, b"agent-proof")
            .await
            .unwrap();
        self.jobs()
            .submit_result(job_id, self.agent, [9; 32])
            .await
            .unwrap();
        let committee = self
            .protocol
            .engine
            .get_round(job_id)
            .await
            .unwrap()
            .committee;
        (job_id, committee)
    }

    pub async fn commit(&self, job_id: JobId, committee: &[Address], votes: &[Vote]) {
        for (i, (validator, vote)) in committee.iter().zip(votes).enumerate() {
            let commitment = compute_commitment(*vote, &salt(i), validator, job_id);
            self.jobs()
                .commit_vote(job_id, *validator, commitment)
                .await
                .unwrap();
        }
    }

    /// Commit and reveal a vote per member, in committee order. Returns the
    /// outcome reported by the final reveal.
    pub async fn vote(
        &self,
        job_id: JobId,
        committee: &[Address],
        votes: &[Vote],
    ) -> Option<agora_consensus::RoundOutcome> {
        self.commit(job_id, committee, votes).await;
        self.clock.advance(WINDOW);
        let mut outcome = None;
        for (i, (validator, vote)) in committee.iter().zip(votes).enumerate() {
            outcome = self
                .jobs()
                .reveal_vote(job_id, *validator, *vote, salt(i))
                .await
                .unwrap()
                .value;
        }
        outcome
    }
}

pub fn salt(i: usize) -> [u8; 32] {
    [i as u8 + 1; 32]
}

pub fn settings(dispute_window_secs: u64) -> ProtocolSettings {
    let mut settings = ProtocolSettings::default();
    settings.consensus = ConsensusParams {
        commit_window_secs: WINDOW,
        reveal_window_secs: WINDOW,
        min_committee_size: 3,
        max_committee_size: 3,
        ..ConsensusParams::default()
    };
    settings.disputes.window_secs = dispute_window_secs;
    settings
}

pub async fn world(settings: ProtocolSettings) -> World {
    world_with_validators(settings, 3).await
}

pub async fn world_with_validators(settings: ProtocolSettings, n: u8) -> World {
    let clock = Arc::new(ManualClock::new(START));
    let owner = settings.jobs.owner;
    let moderator = settings.disputes.moderator;
    let protocol = Protocol::in_memory(
        settings,
        clock.clone(),
        Arc::new(DeterministicBeacon::from_label("agora-tests")),
    )
    .unwrap();

    let employer = Address::from_label("employer");
    let agent = Address::from_label("agent");
    let balances = &protocol.economics.balances;
    balances.mint(employer, Amount::new(1_000)).await.unwrap();
    balances.mint(agent, Amount::new(100)).await.unwrap();
    protocol.identity.allow(agent, Role::Agent).await;
    protocol
        .jobs
        .deposit_stake(agent, Role::Agent, Amount::new(20))
        .await
        .unwrap();

    let mut validators = Vec::new();
    for i in 0..n {
        let v = Address::from_label(&format!("validator-{}", i));
        balances.mint(v, Amount::new(100)).await.unwrap();
        protocol.identity.allow(v, Role::Validator).await;
        protocol
            .jobs
            .deposit_stake(v, Role::Validator, Amount::new(50))
            .await
            .unwrap();
        protocol.jobs.register_validator(v, b"validator-proof").await.unwrap();
        validators.push(v);
    }

    World {
        protocol,
        clock,
        employer,
        agent,
        validators,
        owner,
        moderator,
    }
}
