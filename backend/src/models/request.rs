//! Server requests and the request queue
//!
//! A [`RequestQueue`] is an unordered bag with one structural invariant:
//! at most one Agent-origin request per couple. A fresher agent update
//! evicts the queued one; an older or duplicate update is dropped on
//! arrival. Source and Forwarder requests are never evicted.
//!
//! Selection order:
//! 1. Oldest creation time first (ties: insertion order)
//! 2. If that is a Source query and a location update for the same couple is
//!    queued, the update goes first (Agent before Forwarder)

use crate::core::time::SimTime;
use serde::{Deserialize, Serialize};

/// Who sent a request to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestOrigin {
    /// Location update after a migration
    Agent,
    /// Last-known hop reported by an expiring forwarder
    Forwarder,
    /// Location query after a broken chain
    Source,
}

impl RequestOrigin {
    pub fn is_update(self) -> bool {
        matches!(self, RequestOrigin::Agent | RequestOrigin::Forwarder)
    }
}

/// A unit of work queued at the server
///
/// For location updates the sequence number is the reported site number,
/// so a higher sequence number always means a fresher location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub origin: RequestOrigin,
    pub sequence_number: u64,
    pub owner_index: usize,
    pub creation_time: SimTime,
}

impl Request {
    pub fn agent(owner_index: usize, site: u64, creation_time: SimTime) -> Self {
        Self {
            origin: RequestOrigin::Agent,
            sequence_number: site,
            owner_index,
            creation_time,
        }
    }

    pub fn forwarder(owner_index: usize, last_known_site: u64, creation_time: SimTime) -> Self {
        Self {
            origin: RequestOrigin::Forwarder,
            sequence_number: last_known_site,
            owner_index,
            creation_time,
        }
    }

    pub fn source(owner_index: usize, attempt: u64, creation_time: SimTime) -> Self {
        Self {
            origin: RequestOrigin::Source,
            sequence_number: attempt,
            owner_index,
            creation_time,
        }
    }
}

/// What happened to a request handed to [`RequestQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushOutcome {
    Queued,
    /// Queued, evicting the older agent update with this sequence number
    Superseded { evicted_sequence: u64 },
    /// Not queued: an agent update at least as fresh is already waiting
    Dropped { queued_sequence: u64 },
}

/// Bag of pending requests
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    /// Requests in insertion order
    requests: Vec<Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request, enforcing agent-update supersession.
    pub fn push(&mut self, request: Request) -> PushOutcome {
        if request.origin != RequestOrigin::Agent {
            self.requests.push(request);
            return PushOutcome::Queued;
        }

        let queued = self.requests.iter().position(|r| {
            r.origin == RequestOrigin::Agent && r.owner_index == request.owner_index
        });

        match queued {
            None => {
                self.requests.push(request);
                PushOutcome::Queued
            }
            Some(index) => {
                let queued_sequence = self.requests[index].sequence_number;
                if request.sequence_number > queued_sequence {
                    self.requests.remove(index);
                    self.requests.push(request);
                    PushOutcome::Superseded {
                        evicted_sequence: queued_sequence,
                    }
                } else {
                    PushOutcome::Dropped { queued_sequence }
                }
            }
        }
    }

    /// Remove and return the next request to serve
    pub fn pop_next(&mut self) -> Option<Request> {
        let index = self.next_index()?;
        Some(self.requests.remove(index))
    }

    /// Look at the next request without removing it
    pub fn peek_next(&self) -> Option<&Request> {
        self.next_index().map(|index| &self.requests[index])
    }

    fn next_index(&self) -> Option<usize> {
        let oldest = self
            .requests
            .iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| {
                a.creation_time
                    .cmp(&b.creation_time)
                    .then_with(|| ia.cmp(ib))
            })
            .map(|(index, _)| index)?;

        let chosen = &self.requests[oldest];
        if chosen.origin != RequestOrigin::Source {
            return Some(oldest);
        }

        let update_for = |origin: RequestOrigin| {
            self.requests
                .iter()
                .position(|r| r.origin == origin && r.owner_index == chosen.owner_index)
        };
        Some(
            update_for(RequestOrigin::Agent)
                .or_else(|| update_for(RequestOrigin::Forwarder))
                .unwrap_or(oldest),
        )
    }

    /// Queued agent update for `owner_index`, if any
    pub fn agent_update(&self, owner_index: usize) -> Option<&Request> {
        self.requests
            .iter()
            .find(|r| r.origin == RequestOrigin::Agent && r.owner_index == owner_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: f64) -> SimTime {
        SimTime::from_millis(millis)
    }

    #[test]
    fn test_older_agent_update_is_dropped() {
        let mut queue = RequestQueue::new();
        assert_eq!(queue.push(Request::agent(0, 4, at(1.0))), PushOutcome::Queued);
        assert_eq!(
            queue.push(Request::agent(0, 2, at(2.0))),
            PushOutcome::Dropped { queued_sequence: 4 }
        );
        assert_eq!(
            queue.push(Request::agent(0, 4, at(3.0))),
            PushOutcome::Dropped { queued_sequence: 4 }
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_supersession_is_per_couple() {
        let mut queue = RequestQueue::new();
        queue.push(Request::agent(0, 3, at(1.0)));
        queue.push(Request::agent(1, 1, at(1.0)));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.agent_update(1).map(|r| r.sequence_number), Some(1));
    }

    #[test]
    fn test_source_requests_are_never_evicted() {
        let mut queue = RequestQueue::new();
        queue.push(Request::source(0, 1, at(1.0)));
        queue.push(Request::source(0, 2, at(2.0)));
        queue.push(Request::forwarder(0, 5, at(3.0)));
        queue.push(Request::forwarder(0, 6, at(4.0)));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_oldest_first() {
        let mut queue = RequestQueue::new();
        queue.push(Request::source(1, 1, at(5.0)));
        queue.push(Request::source(2, 1, at(2.0)));
        queue.push(Request::agent(3, 9, at(3.0)));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|r| r.owner_index)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_update_served_before_same_couple_query() {
        let mut queue = RequestQueue::new();
        queue.push(Request::source(0, 1, at(1.0)));
        queue.push(Request::forwarder(0, 3, at(2.0)));
        queue.push(Request::agent(0, 4, at(3.0)));

        assert_eq!(queue.pop_next().map(|r| r.origin), Some(RequestOrigin::Agent));
        assert_eq!(
            queue.pop_next().map(|r| r.origin),
            Some(RequestOrigin::Forwarder)
        );
        assert_eq!(queue.pop_next().map(|r| r.origin), Some(RequestOrigin::Source));
        assert!(queue.pop_next().is_none());
    }
}
