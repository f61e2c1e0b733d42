//! Location server
//!
//! The authoritative directory shared by every couple. It accepts agent and
//! forwarder location updates and answers source queries, one request at a
//! time.
//!
//! # Queueing disciplines
//!
//! - **SingleQueue**: one [`RequestQueue`] for all couples, oldest first.
//! - **PerCouple**: one queue per couple, scanned cyclically starting after
//!   the last served couple and skipping empty queues, so one busy couple
//!   cannot starve the others.
//!
//! # State machine
//!
//! ```text
//! Idle ──► ServingAgent / ServingForwarder ──────────────► Idle (or next)
//!     └──► ServingSource ──► SendingReply ──► (reply) ───► Idle (or next)
//! ```
//!
//! The server model only keeps its own state; the driver arms its timer and
//! delivers replies to sources.

use crate::core::calendar::EntityRef;
use crate::core::entity::{SimulationEntity, Timer};
use crate::core::time::SimTime;
use crate::models::request::{PushOutcome, Request, RequestOrigin, RequestQueue};
use crate::orchestrator::config::ServerMode;
use crate::stats::Accumulator;
use serde::{Deserialize, Serialize};

/// Discrete state of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerState {
    Idle,
    ServingAgent,
    ServingForwarder,
    ServingSource,
    /// A query answer is travelling back to its source
    SendingReply,
}

/// Last known location of one couple's agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub site: u64,
    /// Sequence number of the update that set `site`
    pub sequence: u64,
}

#[derive(Debug, Clone)]
enum Queues {
    Single(RequestQueue),
    PerCouple {
        queues: Vec<RequestQueue>,
        last_served: usize,
    },
}

/// Running statistics of the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerStats {
    /// Time between request creation and start of service, all origins
    pub queueing_delay: Accumulator,
    pub agent_queueing_delay: Accumulator,
    pub source_queueing_delay: Accumulator,
    pub agent_service_time: Accumulator,
    pub source_service_time: Accumulator,
    pub reply_time: Accumulator,
    pub agent_updates_served: u64,
    pub forwarder_updates_served: u64,
    pub queries_served: u64,
    /// Queued agent updates evicted by a fresher one
    pub superseded: u64,
    /// Agent updates refused because a fresher one was already queued
    pub dropped_on_arrival: u64,
    /// Updates served but older than the directory entry
    pub stale_updates_discarded: u64,
    /// Total milliseconds spent outside `Idle`
    pub busy_time: f64,
}

/// The location server
#[derive(Debug, Clone)]
pub struct Server {
    queues: Queues,
    directory: Vec<DirectoryEntry>,
    state: ServerState,
    current: Option<Request>,
    service_started: SimTime,
    busy_since: Option<SimTime>,
    reply_site: u64,
    timer: Timer,
    stats: ServerStats,
}

impl Server {
    pub fn new(mode: ServerMode, couples: usize) -> Self {
        let queues = match mode {
            ServerMode::SingleQueue => Queues::Single(RequestQueue::new()),
            ServerMode::PerCouple => Queues::PerCouple {
                queues: vec![RequestQueue::new(); couples],
                // the first scan starts at couple 0
                last_served: couples.saturating_sub(1),
            },
        };
        Self {
            queues,
            directory: vec![DirectoryEntry::default(); couples],
            state: ServerState::Idle,
            current: None,
            service_started: SimTime::ZERO,
            busy_since: None,
            reply_site: 0,
            timer: Timer::new(EntityRef::Server),
            stats: ServerStats::default(),
        }
    }

    pub fn mode(&self) -> ServerMode {
        match self.queues {
            Queues::Single(_) => ServerMode::SingleQueue,
            Queues::PerCouple { .. } => ServerMode::PerCouple,
        }
    }

    /// Queue a request. The caller starts service when the server is idle.
    pub fn enqueue(&mut self, request: Request) -> PushOutcome {
        let queue = match &mut self.queues {
            Queues::Single(queue) => queue,
            Queues::PerCouple { queues, .. } => &mut queues[request.owner_index],
        };
        let outcome = queue.push(request);
        match outcome {
            PushOutcome::Superseded { .. } => self.stats.superseded += 1,
            PushOutcome::Dropped { .. } => self.stats.dropped_on_arrival += 1,
            PushOutcome::Queued => {}
        }
        outcome
    }

    /// Pick and remove the next request according to the queue discipline
    pub fn select_next_request(&mut self) -> Option<Request> {
        match &mut self.queues {
            Queues::Single(queue) => queue.pop_next(),
            Queues::PerCouple {
                queues,
                last_served,
            } => {
                let count = queues.len();
                for offset in 1..=count {
                    let index = (*last_served + offset) % count;
                    if let Some(request) = queues[index].pop_next() {
                        *last_served = index;
                        return Some(request);
                    }
                }
                None
            }
        }
    }

    /// Couple most recently served in per-couple mode
    pub fn last_served(&self) -> Option<usize> {
        match &self.queues {
            Queues::Single(_) => None,
            Queues::PerCouple { last_served, .. } => Some(*last_served),
        }
    }

    /// Move the round-robin cursor (per-couple mode only)
    pub fn set_last_served(&mut self, couple: usize) {
        if let Queues::PerCouple { last_served, .. } = &mut self.queues {
            *last_served = couple;
        }
    }

    /// Start serving `request` at `now`; returns the new state
    pub fn begin_service(&mut self, request: Request, now: SimTime) -> ServerState {
        let waited = now - request.creation_time;
        self.stats.queueing_delay.add(waited);
        match request.origin {
            RequestOrigin::Source => self.stats.source_queueing_delay.add(waited),
            _ => self.stats.agent_queueing_delay.add(waited),
        }

        if self.busy_since.is_none() {
            self.busy_since = Some(now);
        }
        self.service_started = now;
        self.current = Some(request);
        self.state = match request.origin {
            RequestOrigin::Agent => ServerState::ServingAgent,
            RequestOrigin::Forwarder => ServerState::ServingForwarder,
            RequestOrigin::Source => ServerState::ServingSource,
        };
        self.state
    }

    /// Finish serving the current location update.
    ///
    /// Returns true when the directory changed; an update that is not newer
    /// than the recorded one is discarded.
    pub fn complete_update(&mut self, now: SimTime) -> bool {
        let Some(request) = self.current.take() else {
            return false;
        };
        self.stats
            .agent_service_time
            .add(now - self.service_started);
        match request.origin {
            RequestOrigin::Agent => self.stats.agent_updates_served += 1,
            RequestOrigin::Forwarder => self.stats.forwarder_updates_served += 1,
            RequestOrigin::Source => {}
        }
        self.apply_update(&request)
    }

    /// Record a location update in the directory if it is fresher
    pub fn apply_update(&mut self, request: &Request) -> bool {
        let entry = &mut self.directory[request.owner_index];
        if request.sequence_number > entry.sequence {
            entry.sequence = request.sequence_number;
            entry.site = request.sequence_number;
            true
        } else {
            self.stats.stale_updates_discarded += 1;
            false
        }
    }

    /// Finish serving the current query and start sending the answer.
    ///
    /// The answer is the directory entry at this instant. `None` when no
    /// query is being served; the server state is left untouched.
    pub fn begin_reply(&mut self, now: SimTime) -> Option<u64> {
        let owner = self.current.as_ref()?.owner_index;
        self.stats
            .source_service_time
            .add(now - self.service_started);
        self.stats.queries_served += 1;
        self.reply_site = self.directory[owner].site;
        self.service_started = now;
        self.state = ServerState::SendingReply;
        Some(self.reply_site)
    }

    /// The reply landed; returns `(couple, site)` for the waiting source
    pub fn complete_reply(&mut self, now: SimTime) -> Option<(usize, u64)> {
        let request = self.current.take()?;
        self.stats.reply_time.add(now - self.service_started);
        Some((request.owner_index, self.reply_site))
    }

    /// Return to idle after the last queued request was handled
    pub fn go_idle(&mut self, now: SimTime) {
        if let Some(since) = self.busy_since.take() {
            self.stats.busy_time += now - since;
        }
        self.current = None;
        self.state = ServerState::Idle;
    }

    /// Busy time including the ongoing busy period, for mid-run reports
    pub fn busy_time_until(&self, now: SimTime) -> f64 {
        self.stats.busy_time + self.busy_since.map(|since| now - since).unwrap_or(0.0)
    }

    pub fn is_idle(&self) -> bool {
        self.state == ServerState::Idle
    }

    pub fn current_request(&self) -> Option<&Request> {
        self.current.as_ref()
    }

    pub fn directory(&self, couple: usize) -> DirectoryEntry {
        self.directory[couple]
    }

    /// Total queued requests over all queues
    pub fn queued(&self) -> usize {
        match &self.queues {
            Queues::Single(queue) => queue.len(),
            Queues::PerCouple { queues, .. } => queues.iter().map(RequestQueue::len).sum(),
        }
    }

    /// Queued agent update for `couple`, if any
    pub fn queued_agent_update(&self, couple: usize) -> Option<&Request> {
        match &self.queues {
            Queues::Single(queue) => queue.agent_update(couple),
            Queues::PerCouple { queues, .. } => queues[couple].agent_update(couple),
        }
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

impl SimulationEntity for Server {
    type State = ServerState;

    fn state(&self) -> ServerState {
        self.state
    }

    fn timer(&self) -> &Timer {
        &self.timer
    }

    fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}
