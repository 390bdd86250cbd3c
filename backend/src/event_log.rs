//! Bounded, sequence-numbered log of coordinator events for `/v1/events`.

use std::collections::VecDeque;

use rng_coordinator::CoordinatorEvent;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: CoordinatorEvent,
}

pub struct EventLog {
    capacity: usize,
    next_seq: u64,
    entries: VecDeque<LoggedEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 1,
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append in emission order, evicting the oldest entries past capacity.
    pub fn extend(&mut self, events: impl IntoIterator<Item = CoordinatorEvent>) {
        for event in events {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(LoggedEvent {
                seq: self.next_seq,
                event,
            });
            self.next_seq += 1;
        }
    }

    /// Entries with `seq > after`, oldest first, at most `limit`.
    pub fn after(&self, after: u64, limit: usize) -> Vec<LoggedEvent> {
        self.entries
            .iter()
            .filter(|entry| entry.seq > after)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }
}
