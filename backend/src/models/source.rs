//! Source model
//!
//! The party trying to reach the agent. Each attempt walks the forwarder
//! chain from the last site the source knows of. A broken chain sends the
//! source to the server for a fresh location, after which it walks again.
//!
//! # State machine
//!
//! ```text
//! Waiting ──(λ)──► Communication ──(reached)──► Waiting
//!                      │  ▲
//!              (broken)│  │(server reply)
//!                      ▼  │
//!        CommunicationFailed ──► CallingServer ──(γ1)──► WaitingServer
//! ```

use crate::core::calendar::EntityRef;
use crate::core::entity::{Scheduler, SimulationEntity, Timer};
use crate::core::time::SimTime;
use crate::rng::RateParameter;
use crate::stats::{Accumulator, SourcePhase};
use serde::{Deserialize, Serialize};

pub const ARRIVAL_LABEL: &str = "arrival";
pub const QUERY_LABEL: &str = "source_query";

/// Discrete state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceState {
    Waiting,
    /// Message travelling along the chain
    Communication,
    CommunicationFailed,
    /// Query on its way to the server
    CallingServer,
    WaitingServer,
}

impl SourceState {
    pub fn phase(self) -> SourcePhase {
        match self {
            SourceState::Waiting => SourcePhase::Waiting,
            SourceState::Communication => SourcePhase::Communicating,
            SourceState::CommunicationFailed | SourceState::CallingServer => {
                SourcePhase::CallingServer
            }
            SourceState::WaitingServer => SourcePhase::WaitingServer,
        }
    }
}

/// Result of a source transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// New attempt: walk the chain from `from_site`
    StartTraversal { attempt: u64, from_site: u64 },
    /// Query reached the server and must be queued there
    QuerySent { attempt: u64 },
}

/// Running statistics of one source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStats {
    /// Attempt start to agent reached
    pub latency: Accumulator,
    /// Traversals needed per successful attempt
    pub tries: Accumulator,
    /// Hops of the successful traversal
    pub hops: Accumulator,
    /// One sample per traversal, true when it broke
    pub failure: Accumulator,
    /// Query sent to reply received
    pub server_wait_time: Accumulator,
    pub interarrival_time: Accumulator,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl SourceStats {
    /// Fold another source's statistics into these
    pub fn merge(&mut self, other: &SourceStats) {
        self.latency.merge(&other.latency);
        self.tries.merge(&other.tries);
        self.hops.merge(&other.hops);
        self.failure.merge(&other.failure);
        self.server_wait_time.merge(&other.server_wait_time);
        self.interarrival_time.merge(&other.interarrival_time);
        self.attempts += other.attempts;
        self.successes += other.successes;
        self.failures += other.failures;
    }
}

#[derive(Debug, Clone)]
pub struct Source {
    couple: usize,
    state: SourceState,
    known_hop: u64,
    attempt: u64,
    attempt_started: SimTime,
    tries: u32,
    state_entered: SimTime,
    timer: Timer,
    stats: SourceStats,
}

impl Source {
    pub fn new(couple: usize) -> Self {
        Self {
            couple,
            state: SourceState::Waiting,
            known_hop: 0,
            attempt: 0,
            attempt_started: SimTime::ZERO,
            tries: 0,
            state_entered: SimTime::ZERO,
            timer: Timer::new(EntityRef::Source(couple)),
            stats: SourceStats::default(),
        }
    }

    pub fn couple(&self) -> usize {
        self.couple
    }

    /// Site the source currently believes the agent is on
    pub fn known_hop(&self) -> u64 {
        self.known_hop
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn start(&mut self, sched: &mut Scheduler<'_>) {
        self.arm_arrival(sched);
    }

    fn arm_arrival(&mut self, sched: &mut Scheduler<'_>) {
        let delay = sched.sample(RateParameter::Arrival);
        self.stats.interarrival_time.add(delay);
        sched.arm(&mut self.timer, delay, ARRIVAL_LABEL);
    }

    fn enter(&mut self, state: SourceState, now: SimTime) {
        self.state = state;
        self.state_entered = now;
    }

    /// The source timer fired. `None` when no transition was expected.
    pub fn on_timer(&mut self, sched: &mut Scheduler<'_>) -> Option<SourceOutcome> {
        let now = sched.now();
        match self.state {
            SourceState::Waiting => {
                self.attempt += 1;
                self.stats.attempts += 1;
                self.attempt_started = now;
                self.tries = 1;
                self.enter(SourceState::Communication, now);
                Some(SourceOutcome::StartTraversal {
                    attempt: self.attempt,
                    from_site: self.known_hop,
                })
            }
            SourceState::CallingServer => {
                self.enter(SourceState::WaitingServer, now);
                Some(SourceOutcome::QuerySent {
                    attempt: self.attempt,
                })
            }
            _ => None,
        }
    }

    /// The chain delivered the message to the agent at `reached_site`
    pub fn traversal_succeeded(&mut self, reached_site: u64, hops: u32, sched: &mut Scheduler<'_>) {
        let now = sched.now();
        self.stats.latency.add(now - self.attempt_started);
        self.stats.tries.add(f64::from(self.tries));
        self.stats.hops.add(f64::from(hops));
        self.stats.failure.add_bool(false);
        self.stats.successes += 1;

        self.known_hop = reached_site;
        self.enter(SourceState::Waiting, now);
        self.arm_arrival(sched);
    }

    /// The chain broke; fall back to the server
    pub fn traversal_failed(&mut self, sched: &mut Scheduler<'_>) {
        let now = sched.now();
        self.stats.failure.add_bool(true);
        self.stats.failures += 1;

        self.enter(SourceState::CommunicationFailed, now);
        self.enter(SourceState::CallingServer, now);
        sched.arm_sampled(&mut self.timer, RateParameter::HopCommunication, QUERY_LABEL);
    }

    /// The server answered with `site`. Returns the site to walk from.
    pub fn server_reply(&mut self, site: u64, now: SimTime) -> u64 {
        self.stats.server_wait_time.add(now - self.state_entered);
        self.known_hop = site;
        self.tries += 1;
        self.enter(SourceState::Communication, now);
        site
    }
}

impl SimulationEntity for Source {
    type State = SourceState;

    fn state(&self) -> SourceState {
        self.state
    }

    fn timer(&self) -> &Timer {
        &self.timer
    }

    fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}
