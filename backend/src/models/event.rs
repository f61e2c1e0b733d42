//! Protocol event log.
//!
//! Captures every significant protocol step of a run so tests and analysis
//! can check what happened and when. Logging is off by default
//! (`SimulationConfig::record_events`); the log grows with the run.
//!
//! # Event Types
//!
//! - **Agent**: migrations, forwarder installation and expiry
//! - **Traversal**: attempt start, forwarding, tensioning, success, failure
//! - **Server**: request enqueue, service, reply
//! - **Driver**: stale calendar events dropped
//!
//! # Example
//!
//! ```rust
//! use location_simulator_core_rs::models::event::{EventLog, SimEvent};
//! use location_simulator_core_rs::SimTime;
//!
//! let mut log = EventLog::new();
//! log.log(SimEvent::Migrated {
//!     time: SimTime::from_millis(12.5),
//!     couple: 0,
//!     from_site: 0,
//!     to_site: 1,
//! });
//!
//! assert_eq!(log.events_of_type("Migrated").len(), 1);
//! assert_eq!(log.events()[0].couple(), Some(0));
//! ```

use crate::core::calendar::EntityRef;
use crate::core::time::SimTime;
use crate::models::request::{PushOutcome, RequestOrigin};

/// A protocol step, stamped with the virtual time it happened at
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Source started a new location attempt
    AttemptStarted {
        time: SimTime,
        couple: usize,
        attempt: u64,
        from_site: u64,
    },

    /// Agent arrived on a new site
    Migrated {
        time: SimTime,
        couple: usize,
        from_site: u64,
        to_site: u64,
    },

    /// Forwarder left behind at the departed site
    ForwarderInstalled {
        time: SimTime,
        couple: usize,
        site: u64,
        alive: bool,
    },

    /// Forwarder lifetime ran out
    ForwarderExpired {
        time: SimTime,
        couple: usize,
        site: u64,
    },

    /// A live forwarder passed the message on to `site + 1`
    MessageForwarded {
        time: SimTime,
        couple: usize,
        site: u64,
    },

    /// Message reached the agent after forwarding; agent held on site
    TensioningStarted {
        time: SimTime,
        couple: usize,
        site: u64,
    },

    TraversalSucceeded {
        time: SimTime,
        couple: usize,
        reached_site: u64,
        hops: u32,
    },

    TraversalFailed {
        time: SimTime,
        couple: usize,
        target: u64,
        hops: u32,
    },

    /// Request handed to the server queues
    RequestEnqueued {
        time: SimTime,
        couple: usize,
        origin: RequestOrigin,
        sequence: u64,
        outcome: PushOutcome,
    },

    /// Server finished serving a request; `applied` is false for a stale
    /// location update and always true for queries
    RequestServed {
        time: SimTime,
        couple: usize,
        origin: RequestOrigin,
        sequence: u64,
        applied: bool,
    },

    /// Query answer delivered to the source
    ServerReplied {
        time: SimTime,
        couple: usize,
        site: u64,
    },

    /// Calendar event whose owner no longer waited for it
    StaleEventDropped {
        time: SimTime,
        owner: EntityRef,
        label: &'static str,
    },
}

impl SimEvent {
    /// Virtual time of the event
    pub fn time(&self) -> SimTime {
        match self {
            SimEvent::AttemptStarted { time, .. }
            | SimEvent::Migrated { time, .. }
            | SimEvent::ForwarderInstalled { time, .. }
            | SimEvent::ForwarderExpired { time, .. }
            | SimEvent::MessageForwarded { time, .. }
            | SimEvent::TensioningStarted { time, .. }
            | SimEvent::TraversalSucceeded { time, .. }
            | SimEvent::TraversalFailed { time, .. }
            | SimEvent::RequestEnqueued { time, .. }
            | SimEvent::RequestServed { time, .. }
            | SimEvent::ServerReplied { time, .. }
            | SimEvent::StaleEventDropped { time, .. } => *time,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            SimEvent::AttemptStarted { .. } => "AttemptStarted",
            SimEvent::Migrated { .. } => "Migrated",
            SimEvent::ForwarderInstalled { .. } => "ForwarderInstalled",
            SimEvent::ForwarderExpired { .. } => "ForwarderExpired",
            SimEvent::MessageForwarded { .. } => "MessageForwarded",
            SimEvent::TensioningStarted { .. } => "TensioningStarted",
            SimEvent::TraversalSucceeded { .. } => "TraversalSucceeded",
            SimEvent::TraversalFailed { .. } => "TraversalFailed",
            SimEvent::RequestEnqueued { .. } => "RequestEnqueued",
            SimEvent::RequestServed { .. } => "RequestServed",
            SimEvent::ServerReplied { .. } => "ServerReplied",
            SimEvent::StaleEventDropped { .. } => "StaleEventDropped",
        }
    }

    /// Couple the event belongs to, if any
    pub fn couple(&self) -> Option<usize> {
        match self {
            SimEvent::AttemptStarted { couple, .. }
            | SimEvent::Migrated { couple, .. }
            | SimEvent::ForwarderInstalled { couple, .. }
            | SimEvent::ForwarderExpired { couple, .. }
            | SimEvent::MessageForwarded { couple, .. }
            | SimEvent::TensioningStarted { couple, .. }
            | SimEvent::TraversalSucceeded { couple, .. }
            | SimEvent::TraversalFailed { couple, .. }
            | SimEvent::RequestEnqueued { couple, .. }
            | SimEvent::RequestServed { couple, .. }
            | SimEvent::ServerReplied { couple, .. } => Some(*couple),
            SimEvent::StaleEventDropped { owner, .. } => match owner {
                EntityRef::Agent(couple)
                | EntityRef::Source(couple)
                | EntityRef::Chain(couple)
                | EntityRef::Forwarder { couple, .. } => Some(*couple),
                EntityRef::Server => None,
            },
        }
    }
}

/// Event log for storing and querying protocol events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&SimEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific couple
    pub fn events_for_couple(&self, couple: usize) -> Vec<&SimEvent> {
        self.events
            .iter()
            .filter(|e| e.couple() == Some(couple))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
