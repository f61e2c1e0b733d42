//! Event calendar with deterministic ordering.
//!
//! Events are ordered by:
//! 1. Fire time (earlier first)
//! 2. Insertion sequence (FIFO for events sharing a fire time)
//!
//! The calendar hands out whole batches: every event sharing the minimal
//! fire time is removed at once, so the driver can process simultaneous
//! events as one atomic simulation step.

use crate::core::time::SimTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies the simulation entity owning an event.
///
/// Entities never hold references to each other; they are addressed by the
/// couple index they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Agent(usize),
    Source(usize),
    Chain(usize),
    /// A forwarder is identified by the site it was left at.
    Forwarder { couple: usize, site: u64 },
    Server,
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Agent(couple) => write!(f, "agent[{}]", couple),
            EntityRef::Source(couple) => write!(f, "source[{}]", couple),
            EntityRef::Chain(couple) => write!(f, "chain[{}]", couple),
            EntityRef::Forwarder { couple, site } => write!(f, "forwarder[{}@{}]", couple, site),
            EntityRef::Server => write!(f, "server"),
        }
    }
}

/// Key for ordering events in the calendar; doubles as the event identity.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct EventKey {
    /// When this event fires.
    pub time: SimTime,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A scheduled state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub key: EventKey,
    pub owner: EntityRef,
    pub label: &'static str,
}

impl Event {
    pub fn fire_time(&self) -> SimTime {
        self.key.time
    }
}

/// Time-ordered queue of pending events.
///
/// # Example
/// ```
/// use location_simulator_core_rs::core::calendar::{Calendar, EntityRef};
/// use location_simulator_core_rs::SimTime;
///
/// let mut calendar = Calendar::new();
/// calendar.insert(SimTime::from_millis(5.0), EntityRef::Agent(0), "wait");
/// calendar.insert(SimTime::from_millis(5.0), EntityRef::Source(0), "arrival");
/// calendar.insert(SimTime::from_millis(9.0), EntityRef::Server, "service");
///
/// let batch = calendar.pop_batch().unwrap();
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch[0].owner, EntityRef::Agent(0));
/// assert_eq!(calendar.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Calendar {
    events: BTreeMap<EventKey, Event>,
    next_sequence: u64,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event, returning its identity for later cancellation.
    pub fn insert(&mut self, time: SimTime, owner: EntityRef, label: &'static str) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.events.insert(key, Event { key, owner, label });
        key
    }

    /// Remove and return every event sharing the minimal fire time.
    ///
    /// Events come back in insertion order. Returns `None` when the calendar
    /// is empty.
    pub fn pop_batch(&mut self) -> Option<Vec<Event>> {
        let time = self.peek_time()?;
        let mut batch = Vec::new();
        while let Some(entry) = self.events.first_entry() {
            if entry.key().time != time {
                break;
            }
            batch.push(entry.remove());
        }
        Some(batch)
    }

    /// Remove a pending event by identity. Returns false if it already fired
    /// or was never scheduled.
    pub fn cancel(&mut self, key: &EventKey) -> bool {
        self.events.remove(key).is_some()
    }

    /// Fire time of the earliest pending event
    pub fn peek_time(&self) -> Option<SimTime> {
        self.events.keys().next().map(|key| key.time)
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.events.contains_key(key)
    }

    /// Number of pending events owned by `owner`
    pub fn pending_for(&self, owner: EntityRef) -> usize {
        self.events.values().filter(|event| event.owner == owner).count()
    }

    /// Iterate pending events in firing order
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: f64) -> SimTime {
        SimTime::from_millis(millis)
    }

    #[test]
    fn test_event_key_as_hash_key() {
        use std::collections::HashSet;

        let key = EventKey {
            time: at(3.0),
            sequence: 1,
        };
        let keys: HashSet<EventKey> = [key, key, EventKey { sequence: 2, ..key }]
            .into_iter()
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&EventKey {
            time: at(3.0),
            sequence: 1,
        }));
    }

    #[test]
    fn test_event_key_ordering() {
        let earlier = EventKey {
            time: at(1.0),
            sequence: 7,
        };
        let later = EventKey {
            time: at(2.0),
            sequence: 1,
        };
        assert!(earlier < later);
    }

    #[test]
    fn test_sequence_breaks_ties() {
        let first = EventKey {
            time: at(1.0),
            sequence: 1,
        };
        let second = EventKey {
            time: at(1.0),
            sequence: 2,
        };
        assert!(first < second, "Insertion order should break time ties");
    }

    #[test]
    fn test_pop_batch_takes_only_minimal_time() {
        let mut calendar = Calendar::new();
        calendar.insert(at(3.0), EntityRef::Server, "late");
        calendar.insert(at(1.0), EntityRef::Agent(0), "a");
        calendar.insert(at(1.0), EntityRef::Agent(1), "b");

        let batch = calendar.pop_batch().unwrap();
        let labels: Vec<_> = batch.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(calendar.peek_time(), Some(at(3.0)));
    }

    #[test]
    fn test_pop_batch_on_empty_calendar() {
        let mut calendar = Calendar::new();
        assert!(calendar.pop_batch().is_none());
    }

    #[test]
    fn test_cancel_is_noop_after_fire() {
        let mut calendar = Calendar::new();
        let key = calendar.insert(at(1.0), EntityRef::Source(0), "arrival");
        assert!(calendar.pop_batch().is_some());
        assert!(!calendar.cancel(&key));
    }
}
