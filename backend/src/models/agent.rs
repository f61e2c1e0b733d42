//! Agent model
//!
//! The mobile object being located. It stays on a site for a while, then
//! migrates to the next site, leaving a forwarder behind at the site it
//! departed from. Every N-th migration it reports its new site to the server.
//!
//! # State machine
//!
//! ```text
//! Waiting ──(wait)──► Migrating ──(δ)──► Waiting
//!    │                    └─(every N-th)──► CallingServer ──(γ1)──► Waiting
//!    └─(wait during tensioning)──► Blocked ──(end tensioning)──► Migrating
//! ```
//!
//! Sites are numbered from 0 and only ever grow, so the site number doubles
//! as the sequence number of location updates.

use crate::core::calendar::EntityRef;
use crate::core::entity::{Scheduler, SimulationEntity, Timer};
use crate::core::time::SimTime;
use crate::models::chain::AgentPosition;
use crate::orchestrator::config::{OnSitePolicy, SimulationConfig};
use crate::rng::RateParameter;
use crate::stats::Accumulator;
use serde::{Deserialize, Serialize};

pub const WAIT_LABEL: &str = "wait";
pub const MIGRATION_LABEL: &str = "migration";
pub const CALL_SERVER_LABEL: &str = "agent_update";

/// Discrete state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    /// On site, wait timer armed
    Waiting,
    /// Between sites
    Migrating,
    /// On the new site, location update in flight to the server
    CallingServer,
    /// Wanted to leave but a message is being delivered
    Blocked,
}

/// Result of an agent transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Departure postponed by tensioning
    Blocked,
    MigrationStarted { from_site: u64 },
    /// Landed on a new site. Unless `calling_server`, the relocation must be
    /// finished right away.
    Arrived {
        from_site: u64,
        to_site: u64,
        calling_server: bool,
    },
    /// The location update reached the server; the relocation must now be
    /// finished
    LocationReported { site: u64 },
}

/// Running statistics of one agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Sampled wait durations, after the on-site cap
    pub wait_time: Accumulator,
    /// Time from arrival on a site to departure, blocking included
    pub on_site_time: Accumulator,
    pub migration_time: Accumulator,
    pub server_call_time: Accumulator,
    pub blocked_time: Accumulator,
    pub location_updates: u64,
}

impl AgentStats {
    pub fn merge(&mut self, other: &AgentStats) {
        self.wait_time.merge(&other.wait_time);
        self.on_site_time.merge(&other.on_site_time);
        self.migration_time.merge(&other.migration_time);
        self.server_call_time.merge(&other.server_call_time);
        self.blocked_time.merge(&other.blocked_time);
        self.location_updates += other.location_updates;
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    couple: usize,
    site: u64,
    state: AgentState,
    migrations: u64,
    departed_from: Option<u64>,
    tensioning: bool,
    calls_server: bool,
    update_period: u64,
    on_site: OnSitePolicy,
    arrived_at: SimTime,
    state_entered: SimTime,
    timer: Timer,
    stats: AgentStats,
}

impl Agent {
    pub fn new(couple: usize, config: &SimulationConfig) -> Self {
        Self {
            couple,
            site: 0,
            state: AgentState::Waiting,
            migrations: 0,
            departed_from: None,
            tensioning: false,
            calls_server: config.agent_calls_server,
            update_period: config.max_migrations_before_update,
            on_site: config.on_site.clone(),
            arrived_at: SimTime::ZERO,
            state_entered: SimTime::ZERO,
            timer: Timer::new(EntityRef::Agent(couple)),
            stats: AgentStats::default(),
        }
    }

    pub fn couple(&self) -> usize {
        self.couple
    }

    /// Current site number
    pub fn site(&self) -> u64 {
        self.site
    }

    pub fn migrations(&self) -> u64 {
        self.migrations
    }

    pub fn is_tensioning(&self) -> bool {
        self.tensioning
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// True while the agent is not available for delivery on its site
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            AgentState::Migrating | AgentState::CallingServer
        )
    }

    /// Site being left whose forwarder is not installed yet
    pub fn pending_site(&self) -> Option<u64> {
        if self.is_busy() {
            self.departed_from
        } else {
            None
        }
    }

    pub fn position(&self) -> AgentPosition {
        AgentPosition {
            site: self.site,
            on_site: matches!(
                self.state,
                AgentState::Waiting | AgentState::Blocked | AgentState::CallingServer
            ),
            waiting: self.state == AgentState::Waiting,
            pending_site: self.pending_site(),
        }
    }

    /// Arm the first wait at the start of the run
    pub fn start(&mut self, sched: &mut Scheduler<'_>) {
        self.arrived_at = sched.now();
        self.enter(AgentState::Waiting, sched.now());
        self.arm_wait(sched);
    }

    fn arm_wait(&mut self, sched: &mut Scheduler<'_>) {
        let wait = self.on_site.wait_duration(sched.sample(RateParameter::Wait));
        self.stats.wait_time.add(wait);
        sched.arm(&mut self.timer, wait, WAIT_LABEL);
    }

    fn enter(&mut self, state: AgentState, now: SimTime) {
        match self.state {
            AgentState::Migrating => self.stats.migration_time.add(now - self.state_entered),
            AgentState::CallingServer => {
                self.stats.server_call_time.add(now - self.state_entered)
            }
            AgentState::Blocked => self.stats.blocked_time.add(now - self.state_entered),
            AgentState::Waiting => {}
        }
        self.state = state;
        self.state_entered = now;
    }

    /// The agent timer fired. `None` when no transition was expected.
    pub fn on_timer(&mut self, sched: &mut Scheduler<'_>) -> Option<AgentOutcome> {
        match self.state {
            AgentState::Waiting if self.tensioning => {
                self.enter(AgentState::Blocked, sched.now());
                Some(AgentOutcome::Blocked)
            }
            AgentState::Waiting => Some(self.begin_migration(sched)),
            AgentState::Migrating => Some(self.arrive(sched)),
            AgentState::CallingServer => {
                self.stats.location_updates += 1;
                Some(AgentOutcome::LocationReported { site: self.site })
            }
            AgentState::Blocked => None,
        }
    }

    fn begin_migration(&mut self, sched: &mut Scheduler<'_>) -> AgentOutcome {
        let now = sched.now();
        self.stats.on_site_time.add(now - self.arrived_at);
        self.departed_from = Some(self.site);
        self.enter(AgentState::Migrating, now);
        sched.arm_sampled(&mut self.timer, RateParameter::Migration, MIGRATION_LABEL);
        AgentOutcome::MigrationStarted {
            from_site: self.site,
        }
    }

    fn arrive(&mut self, sched: &mut Scheduler<'_>) -> AgentOutcome {
        let from_site = self.site;
        self.site += 1;
        self.migrations += 1;

        let calling_server = self.calls_server && self.migrations % self.update_period == 0;
        if calling_server {
            self.enter(AgentState::CallingServer, sched.now());
            sched.arm_sampled(
                &mut self.timer,
                RateParameter::HopCommunication,
                CALL_SERVER_LABEL,
            );
        }
        AgentOutcome::Arrived {
            from_site,
            to_site: self.site,
            calling_server,
        }
    }

    /// Settle on the new site and wait again.
    ///
    /// Returns the departed site; the caller installs its forwarder.
    pub fn finish_relocation(&mut self, sched: &mut Scheduler<'_>) -> u64 {
        let now = sched.now();
        let departed = self.departed_from.take().unwrap_or(self.site.saturating_sub(1));
        self.arrived_at = now;
        self.enter(AgentState::Waiting, now);
        self.arm_wait(sched);
        departed
    }

    /// A message is being delivered; the agent must not leave
    pub fn start_tensioning(&mut self) {
        self.tensioning = true;
    }

    /// Delivery is over. A blocked agent leaves at once.
    pub fn end_tensioning(&mut self, sched: &mut Scheduler<'_>) -> Option<AgentOutcome> {
        self.tensioning = false;
        if self.state == AgentState::Blocked {
            Some(self.begin_migration(sched))
        } else {
            None
        }
    }
}

impl SimulationEntity for Agent {
    type State = AgentState;

    fn state(&self) -> AgentState {
        self.state
    }

    fn timer(&self) -> &Timer {
        &self.timer
    }

    fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}
