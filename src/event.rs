//! Structured events recorded by a queue as it is filled and drained.
//!
//! The journal is bounded: once full, the oldest events are dropped. Sequence
//! numbers keep counting so consumers can detect the gap.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Placement;

/// A structured event emitted by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    NodeQueued {
        description: String,
        placement: Placement,
        depth: usize,
    },
    NodeCompleted {
        description: String,
        duration_us: u64,
    },
    NodeFailed {
        description: String,
        error: String,
    },
    SliceYielded {
        executed: usize,
    },
    DrainCompleted {
        executed: usize,
        failed: usize,
    },
}

/// Bounded in-memory event log.
#[derive(Debug, Clone)]
pub struct Journal {
    capacity: usize,
    next_seq: u64,
    events: VecDeque<QueueEvent>,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 1,
            events: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn record(&mut self, kind: EventKind) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(QueueEvent {
            seq: self.next_seq,
            timestamp: Utc::now(),
            kind,
        });
        self.next_seq += 1;
    }

    pub fn events(&self) -> impl Iterator<Item = &QueueEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> Vec<QueueEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yielded(executed: usize) -> EventKind {
        EventKind::SliceYielded { executed }
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut journal = Journal::new(2);
        journal.record(yielded(1));
        journal.record(yielded(2));
        journal.record(yielded(3));

        let seqs: Vec<u64> = journal.events().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(journal.events().next().unwrap().kind, yielded(2));
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut journal = Journal::new(0);
        journal.record(yielded(1));
        assert!(journal.is_empty());
    }

    #[test]
    fn kinds_serialize_with_snake_case_tag() {
        let json = serde_json::to_value(EventKind::NodeQueued {
            description: "sum worker".to_string(),
            placement: Placement::Tail,
            depth: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "node_queued");
        assert_eq!(json["placement"], "tail");
    }
}
