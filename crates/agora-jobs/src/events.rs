use agora_consensus::{RoundOutcome, Verdict, Vote};
use agora_types::{Address, Amount, JobId, Role, Timestamp, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::ForceFinalizePolicy;

/// Record of a state transition, for indexers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    JobCreated {
        job_id: JobId,
        employer: Address,
        reward: Amount,
        required_agent_stake: Amount,
        deadline: Timestamp,
        content_hash: String,
    },
    JobApplied {
        job_id: JobId,
        agent: Address,
        stake_locked: Amount,
    },
    ResultSubmitted {
        job_id: JobId,
        agent: Address,
        result_hash: String,
    },
    CommitteeSelected {
        job_id: JobId,
        committee: Vec<Address>,
        params_version: u32,
        commit_deadline: Timestamp,
        reveal_deadline: Timestamp,
    },
    VoteCommitted {
        job_id: JobId,
        validator: Address,
    },
    VoteRevealed {
        job_id: JobId,
        validator: Address,
        vote: Vote,
    },
    RoundTallied {
        job_id: JobId,
        outcome: RoundOutcome,
        approvals: u64,
        rejections: u64,
        dispute_deadline: Option<Timestamp>,
    },
    QuorumNotReached {
        job_id: JobId,
        committee_size: usize,
    },
    ValidatorSettled {
        job_id: JobId,
        validator: Address,
        verdict: Verdict,
        unlocked: Amount,
        reward: Amount,
    },
    StakeSlashed {
        participant: Address,
        role: Role,
        amount: Amount,
        beneficiary: Address,
        beneficiary_share: Amount,
        treasury_share: Amount,
        burned: Amount,
    },
    StakeDeposited {
        participant: Address,
        role: Role,
        amount: Amount,
    },
    StakeWithdrawn {
        participant: Address,
        role: Role,
        amount: Amount,
    },
    ValidatorRegistered {
        validator: Address,
    },
    JobFinalized {
        job_id: JobId,
        success: Option<bool>,
        agent_payout: Amount,
        fee: Amount,
        validator_pool: Amount,
        employer_refund: Amount,
    },
    JobCancelled {
        job_id: JobId,
        refunded: Amount,
    },
    JobExpired {
        job_id: JobId,
        refunded: Amount,
        agent_stake_released: Amount,
    },
    DisputeRaised {
        job_id: JobId,
        raised_by: Address,
        evidence_hash: String,
        bond: Amount,
    },
    DisputeResolved {
        job_id: JobId,
        employer_wins: bool,
        bond_recipient: Option<Address>,
    },
    ForceFinalized {
        job_id: JobId,
        policy: ForceFinalizePolicy,
    },
    CertificateIssued {
        job_id: JobId,
        recipient: Address,
        certificate_id: u64,
    },
    ParamsUpdated {
        version: u32,
    },
}

impl ProtocolEvent {
    pub fn job_id(&self) -> Option<JobId> {
        use ProtocolEvent::*;
        match self {
            JobCreated { job_id, .. }
            | JobApplied { job_id, .. }
            | ResultSubmitted { job_id, .. }
            | CommitteeSelected { job_id, .. }
            | VoteCommitted { job_id, .. }
            | VoteRevealed { job_id, .. }
            | RoundTallied { job_id, .. }
            | QuorumNotReached { job_id, .. }
            | ValidatorSettled { job_id, .. }
            | JobFinalized { job_id, .. }
            | JobCancelled { job_id, .. }
            | JobExpired { job_id, .. }
            | DisputeRaised { job_id, .. }
            | DisputeResolved { job_id, .. }
            | ForceFinalized { job_id, .. }
            | CertificateIssued { job_id, .. } => Some(*job_id),
            StakeSlashed { .. }
            | StakeDeposited { .. }
            | StakeWithdrawn { .. }
            | ValidatorRegistered { .. }
            | ParamsUpdated { .. } => None,
        }
    }
}

/// Event stamped with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: Timestamp,
    pub protocol_version: u8,
    #[serde(flatten)]
    pub event: ProtocolEvent,
}

/// Successful result of a mutating operation plus the events it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt<T> {
    pub value: T,
    pub events: Vec<ProtocolEvent>,
}

impl<T> Receipt<T> {
    pub fn new(value: T, events: Vec<ProtocolEvent>) -> Self {
        Self { value, events }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Receipt<U> {
        Receipt {
            value: f(self.value),
            events: self.events,
        }
    }
}

/// Append-only event log with cursor reads and an optional live stream
#[derive(Default)]
pub struct EventLog {
    records: Arc<RwLock<Vec<EventRecord>>>,
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<EventRecord>>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, events: &[ProtocolEvent], at: Timestamp) {
        if events.is_empty() {
            return;
        }
        let mut records = self.records.write().await;
        let mut subscribers = self.subscribers.write().await;
        for event in events {
            let record = EventRecord {
                seq: records.len() as u64,
                at,
                protocol_version: PROTOCOL_VERSION,
                event: event.clone(),
            };
            // Closed receivers are dropped from the subscriber list
            subscribers.retain(|tx| tx.send(record.clone()).is_ok());
            records.push(record);
        }
        debug!(appended = events.len(), total = records.len(), "Events recorded");
    }

    /// Records starting at `cursor`, at most `limit`; returns the next cursor
    pub async fn read_from(&self, cursor: u64, limit: usize) -> (Vec<EventRecord>, u64) {
        let records = self.records.read().await;
        let start = (cursor as usize).min(records.len());
        let end = start.saturating_add(limit).min(records.len());
        (records[start..end].to_vec(), end as u64)
    }

    pub async fn for_job(&self, job_id: JobId) -> Vec<EventRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| r.event.job_id() == Some(job_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Live stream of records appended after this call
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<EventRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: u64) -> ProtocolEvent {
        ProtocolEvent::JobCreated {
            job_id: JobId::new(id),
            employer: Address::from_bytes([1; 32]),
            reward: Amount::new(100),
            required_agent_stake: Amount::new(20),
            deadline: 10,
            content_hash: "00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cursor_reads() {
        let log = EventLog::new();
        log.append(&[created(1), created(2), created(3)], 5).await;

        let (first, next) = log.read_from(0, 2).await;
        assert_eq!(first.len(), 2);
        assert_eq!(next, 2);
        let (rest, next) = log.read_from(next, 10).await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].seq, 2);
        assert_eq!(next, 3);
        let (none, next) = log.read_from(next, 10).await;
        assert!(none.is_empty());
        assert_eq!(next, 3);
    }

    #[tokio::test]
    async fn test_subscription_streams_new_records() {
        let log = EventLog::new();
        log.append(&[created(1)], 0).await;
        let mut rx = log.subscribe().await;
        log.append(&[created(2)], 1).await;

        let record = rx.recv().await.unwrap();
        assert_eq!(record.seq, 1);
        assert_eq!(record.event.job_id(), Some(JobId::new(2)));
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = EventRecord {
            seq: 0,
            at: 1,
            protocol_version: PROTOCOL_VERSION,
            event: ProtocolEvent::ParamsUpdated { version: 2 },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "params_updated");
        assert_eq!(json["version"], 2);
        assert_eq!(json["seq"], 0);
    }
}
