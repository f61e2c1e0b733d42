//! Orchestrator Engine
//!
//! Main simulation loop. The orchestrator owns the calendar, the virtual
//! clock, the duration generators and the simulation state, and moves the
//! run forward one batch at a time.
//!
//! # Architecture
//!
//! ```text
//! For each step:
//! 1. Peek the earliest fire time; stop if it lies past the run length
//! 2. Pop every event sharing that time (one batch)
//! 3. Advance the clock to the batch time
//! 4. Dispatch the events in insertion order, dropping stale ones
//! 5. Sample every couple's state for path analysis
//! ```
//!
//! Events scheduled while a batch is dispatched at the same instant belong to
//! the next batch; the clock does not move between the two.
//!
//! # Example
//!
//! ```rust
//! use location_simulator_core_rs::{Orchestrator, SimulationConfig};
//!
//! let config = SimulationConfig {
//!     couples: 2,
//!     run_length: 5_000.0,
//!     ..Default::default()
//! };
//!
//! let mut orchestrator = Orchestrator::new(config).unwrap();
//! let report = orchestrator.run().unwrap();
//! assert_eq!(report.couples.len(), 2);
//! assert_eq!(report.elapsed, 5_000.0);
//! ```

use crate::core::calendar::{Calendar, EntityRef, Event};
use crate::core::entity::{Scheduler, SimulationEntity};
use crate::core::time::{SimClock, SimTime};
use crate::models::agent::AgentOutcome;
use crate::models::chain::HopOutcome;
use crate::models::event::SimEvent;
use crate::models::forwarder::ForwarderState;
use crate::models::request::Request;
use crate::models::server::ServerState;
use crate::models::source::{SourceOutcome, SourceState};
use crate::models::state::SimulationState;
use crate::models::ChainState;
use crate::orchestrator::config::{ConfigError, ForwarderLifetime, SimulationConfig};
use crate::orchestrator::report::{compute_config_hash, SimulationReport};
use crate::rng::{DurationGenerators, RateParameter};
use crate::stats::{PathState, PathTracker};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

pub const SERVICE_LABEL: &str = "service";
pub const REPLY_LABEL: &str = "reply";

/// Simulation error types
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No event left before the end of the run; the model is broken
    #[error("Calendar exhausted at {now} before the end of the run at {end}")]
    CalendarExhausted { now: SimTime, end: SimTime },

    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityRef),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result of a single step
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Clock after the step
    pub time: SimTime,

    /// Events popped in this batch
    pub num_events: usize,

    /// Events dropped because their owner no longer waited for them
    pub num_stale: usize,

    /// The next event lies past the run length; nothing was dispatched
    pub finished: bool,
}

/// Main simulation orchestrator
pub struct Orchestrator {
    state: SimulationState,
    calendar: Calendar,
    clock: SimClock,
    generators: DurationGenerators,
    paths: PathTracker,
    config_hash: String,
    batches: u64,
    events_dispatched: u64,
    finished: bool,
}

impl Orchestrator {
    /// Validate the configuration, build every entity and arm the initial
    /// timers (agent waits and source arrivals).
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let config_hash = compute_config_hash(&config)?;

        let mut calendar = Calendar::new();
        let mut generators =
            DurationGenerators::new(config.seed, &config.rates, config.lifetime_rate());
        let clock = SimClock::new(config.run_length);
        let paths = PathTracker::new(&config.reference_paths, config.couples);
        let mut state = SimulationState::new(config);

        {
            let mut sched = Scheduler::new(&mut calendar, &mut generators, clock.now());
            for agent in &mut state.agents {
                agent.start(&mut sched);
            }
            for source in &mut state.sources {
                source.start(&mut sched);
            }
        }

        Ok(Self {
            state,
            calendar,
            clock,
            generators,
            paths,
            config_hash,
            batches: 0,
            events_dispatched: 0,
            finished: false,
        })
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        self.state.config()
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn generators(&self) -> &DurationGenerators {
        &self.generators
    }

    pub fn paths(&self) -> &PathTracker {
        &self.paths
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process one batch of simultaneous events
    pub fn step(&mut self) -> Result<StepResult, SimulationError> {
        if self.finished {
            return Ok(self.finished_step());
        }

        let next = self
            .calendar
            .peek_time()
            .ok_or(SimulationError::CalendarExhausted {
                now: self.clock.now(),
                end: self.clock.end(),
            })?;

        if self.clock.is_past_end(next) {
            self.clock.advance_to(self.clock.end());
            self.finished = true;
            return Ok(self.finished_step());
        }

        let batch = self
            .calendar
            .pop_batch()
            .ok_or(SimulationError::CalendarExhausted {
                now: self.clock.now(),
                end: self.clock.end(),
            })?;
        self.clock.advance_to(next);
        self.batches += 1;

        let mut num_stale = 0;
        {
            let mut sched = Scheduler::new(&mut self.calendar, &mut self.generators, next);
            for event in &batch {
                trace!(time = %next, owner = %event.owner, label = event.label, "dispatch");
                if !dispatch(&mut self.state, event, &mut sched)? {
                    num_stale += 1;
                    self.state.count_stale_event();
                    self.state.record(SimEvent::StaleEventDropped {
                        time: next,
                        owner: event.owner,
                        label: event.label,
                    });
                    trace!(owner = %event.owner, label = event.label, "stale event dropped");
                }
            }
        }
        self.events_dispatched += (batch.len() - num_stale) as u64;

        if self.paths.is_enabled() {
            for couple in 0..self.state.num_couples() {
                let sample = path_state(&self.state, couple);
                self.paths.observe(couple, sample, next);
            }
        }

        Ok(StepResult {
            time: next,
            num_events: batch.len(),
            num_stale,
            finished: false,
        })
    }

    fn finished_step(&self) -> StepResult {
        StepResult {
            time: self.clock.now(),
            num_events: 0,
            num_stale: 0,
            finished: true,
        }
    }

    /// Step until the next event lies past the run length
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        let config = self.state.config();
        info!(
            couples = config.couples,
            run_length = config.run_length,
            seed = config.seed,
            server_mode = ?config.server_mode,
            config_hash = %self.config_hash,
            "starting simulation"
        );

        while !self.step()?.finished {}

        let report = self.report();
        info!(
            batches = self.batches,
            events = self.events_dispatched,
            stale = self.state.stale_events(),
            "simulation finished"
        );
        Ok(report)
    }

    /// Statistics collected so far; usable mid-run
    pub fn report(&self) -> SimulationReport {
        SimulationReport::build(
            &self.state,
            &self.paths,
            &self.config_hash,
            self.clock.elapsed(),
            self.batches,
            self.events_dispatched,
        )
    }
}

/// Observable state of one couple for path analysis
fn path_state(state: &SimulationState, couple: usize) -> PathState {
    let chain = &state.chains[couple];
    PathState {
        hop_count: chain.traversal().map(|t| t.hops).unwrap_or(0),
        agent_busy: state.agents[couple].is_busy(),
        source_phase: state.sources[couple].state().phase(),
        ambiguity: matches!(
            chain.state(),
            ChainState::WaitingAgent | ChainState::Tensioning
        ),
    }
}

fn check_couple(state: &SimulationState, owner: EntityRef, couple: usize) -> Result<(), SimulationError> {
    if couple < state.num_couples() {
        Ok(())
    } else {
        Err(SimulationError::UnknownEntity(owner))
    }
}

/// Route one event to its owner. Returns false for a stale event.
fn dispatch(
    state: &mut SimulationState,
    event: &Event,
    sched: &mut Scheduler<'_>,
) -> Result<bool, SimulationError> {
    match event.owner {
        EntityRef::Agent(couple) => {
            check_couple(state, event.owner, couple)?;
            if !state.agents[couple].timer_mut().fire(event.key) {
                return Ok(false);
            }
            match state.agents[couple].on_timer(sched) {
                Some(outcome) => handle_agent_outcome(state, couple, outcome, sched),
                None => warn!(agent = couple, label = event.label, "unexpected agent timer"),
            }
        }
        EntityRef::Source(couple) => {
            check_couple(state, event.owner, couple)?;
            if !state.sources[couple].timer_mut().fire(event.key) {
                return Ok(false);
            }
            match state.sources[couple].on_timer(sched) {
                Some(SourceOutcome::StartTraversal { attempt, from_site }) => {
                    debug!(couple, attempt, from_site, "attempt started");
                    state.record(SimEvent::AttemptStarted {
                        time: sched.now(),
                        couple,
                        attempt,
                        from_site,
                    });
                    state.chains[couple].start_communication(from_site, sched);
                }
                Some(SourceOutcome::QuerySent { attempt }) => {
                    enqueue_request(state, Request::source(couple, attempt, sched.now()), sched);
                }
                None => warn!(source = couple, label = event.label, "unexpected source timer"),
            }
        }
        EntityRef::Chain(couple) => {
            check_couple(state, event.owner, couple)?;
            if !state.chains[couple].timer_mut().fire(event.key) {
                return Ok(false);
            }
            let position = state.agents[couple].position();
            match state.chains[couple].on_timer(position, sched) {
                Some(outcome) => handle_hop_outcome(state, couple, outcome, sched),
                None => warn!(chain = couple, label = event.label, "unexpected chain timer"),
            }
        }
        EntityRef::Forwarder { couple, site } => {
            check_couple(state, event.owner, couple)?;
            // A flushed forwarder is gone from the chain; its event is stale.
            if !state.chains[couple].fire_forwarder(site, event.key) {
                return Ok(false);
            }
            handle_forwarder_timer(state, couple, site, sched);
        }
        EntityRef::Server => {
            if !state.server.timer_mut().fire(event.key) {
                return Ok(false);
            }
            handle_server_timer(state, sched);
        }
    }
    Ok(true)
}

fn handle_agent_outcome(
    state: &mut SimulationState,
    couple: usize,
    outcome: AgentOutcome,
    sched: &mut Scheduler<'_>,
) {
    match outcome {
        AgentOutcome::Blocked => {
            debug!(couple, site = state.agents[couple].site(), "agent blocked by tensioning");
        }
        AgentOutcome::MigrationStarted { from_site } => {
            debug!(couple, from_site, "migration started");
        }
        AgentOutcome::Arrived {
            from_site,
            to_site,
            calling_server,
        } => {
            debug!(couple, from_site, to_site, calling_server, "agent arrived");
            state.record(SimEvent::Migrated {
                time: sched.now(),
                couple,
                from_site,
                to_site,
            });
            if !calling_server {
                finish_relocation(state, couple, sched);
            }
        }
        AgentOutcome::LocationReported { site } => {
            enqueue_request(state, Request::agent(couple, site, sched.now()), sched);
            finish_relocation(state, couple, sched);
        }
    }
}

/// The agent settles on its new site and the forwarder for the departed
/// site is installed.
fn finish_relocation(state: &mut SimulationState, couple: usize, sched: &mut Scheduler<'_>) {
    let departed = state.agents[couple].finish_relocation(sched);
    let alive = state.config().forwarders_born_alive;
    let lifetime = if alive {
        forwarder_lifetime(state, couple, sched)
    } else {
        None
    };

    state.record(SimEvent::ForwarderInstalled {
        time: sched.now(),
        couple,
        site: departed,
        alive,
    });

    if let Some(outcome) = state.chains[couple].install_forwarder(departed, alive, lifetime, sched) {
        handle_hop_outcome(state, couple, outcome, sched);
    }
}

/// Lifetime of a new forwarder, `None` when forwarders never expire
fn forwarder_lifetime(
    state: &SimulationState,
    couple: usize,
    sched: &mut Scheduler<'_>,
) -> Option<f64> {
    let multiplier = state.ttl_multiplier(couple);
    match state.config().forwarder_lifetime {
        ForwarderLifetime::Exponential { .. } => {
            Some(sched.sample(RateParameter::ForwarderLifetime) * multiplier)
        }
        ForwarderLifetime::Fixed { ttl } => Some(ttl * multiplier),
        ForwarderLifetime::Infinite => None,
    }
}

fn handle_hop_outcome(
    state: &mut SimulationState,
    couple: usize,
    outcome: HopOutcome,
    sched: &mut Scheduler<'_>,
) {
    let now = sched.now();
    match outcome {
        HopOutcome::Forwarded { from_site } => {
            trace!(couple, from_site, "message forwarded");
            state.record(SimEvent::MessageForwarded {
                time: now,
                couple,
                site: from_site,
            });
        }
        HopOutcome::Tensioning { site } => {
            debug!(couple, site, "tensioning started");
            state.agents[couple].start_tensioning();
            state.record(SimEvent::TensioningStarted {
                time: now,
                couple,
                site,
            });
        }
        HopOutcome::WaitingAgent { site } => {
            debug!(couple, site, "message waiting for departing agent");
        }
        HopOutcome::Reached { site, hops } => {
            debug!(couple, site, hops, "traversal succeeded");
            state.record(SimEvent::TraversalSucceeded {
                time: now,
                couple,
                reached_site: site,
                hops,
            });
            state.adapt_ttl(couple, true);
            state.sources[couple].traversal_succeeded(site, hops, sched);
            if state.agents[couple].is_tensioning() {
                if let Some(released) = state.agents[couple].end_tensioning(sched) {
                    handle_agent_outcome(state, couple, released, sched);
                }
            }
        }
        HopOutcome::Failed { target, hops } => {
            debug!(couple, target, hops, "traversal failed");
            state.record(SimEvent::TraversalFailed {
                time: now,
                couple,
                target,
                hops,
            });
            state.adapt_ttl(couple, false);
            state.sources[couple].traversal_failed(sched);
        }
    }
}

fn handle_forwarder_timer(
    state: &mut SimulationState,
    couple: usize,
    site: u64,
    sched: &mut Scheduler<'_>,
) {
    let current = state.chains[couple].forwarder(site).map(|f| f.state());
    match current {
        Some(ForwarderState::Actif) => {
            debug!(couple, site, "forwarder expired");
            state.record(SimEvent::ForwarderExpired {
                time: sched.now(),
                couple,
                site,
            });
            let calls_server = state.config().forwarder_calls_server;
            state.chains[couple].expire_forwarder(site, calls_server, sched);
        }
        Some(ForwarderState::UpdatingServer) => {
            if let Some(last_hop) = state.chains[couple].finish_forwarder_update(site) {
                enqueue_request(state, Request::forwarder(couple, last_hop, sched.now()), sched);
            }
        }
        Some(ForwarderState::Dead) | None => {
            warn!(couple, site, "unexpected forwarder timer");
        }
    }
}

/// Queue a request at the server, starting service if it is idle
fn enqueue_request(state: &mut SimulationState, request: Request, sched: &mut Scheduler<'_>) {
    let outcome = state.server.enqueue(request);
    trace!(couple = request.owner_index, origin = ?request.origin, ?outcome, "request enqueued");
    state.record(SimEvent::RequestEnqueued {
        time: sched.now(),
        couple: request.owner_index,
        origin: request.origin,
        sequence: request.sequence_number,
        outcome,
    });
    if state.server.is_idle() {
        serve_next_request(state, sched);
    }
}

/// Start on the next queued request, or go idle
fn serve_next_request(state: &mut SimulationState, sched: &mut Scheduler<'_>) {
    let now = sched.now();
    match state.server.select_next_request() {
        Some(request) => {
            state.server.begin_service(request, now);
            let parameter = if request.origin.is_update() {
                RateParameter::AgentService
            } else {
                RateParameter::SourceService
            };
            sched.arm_sampled(state.server.timer_mut(), parameter, SERVICE_LABEL);
        }
        None => state.server.go_idle(now),
    }
}

fn handle_server_timer(state: &mut SimulationState, sched: &mut Scheduler<'_>) {
    let now = sched.now();
    match state.server.state() {
        ServerState::ServingAgent | ServerState::ServingForwarder => {
            let request = state.server.current_request().copied();
            let applied = state.server.complete_update(now);
            if let Some(request) = request {
                debug!(
                    couple = request.owner_index,
                    origin = ?request.origin,
                    site = request.sequence_number,
                    applied,
                    "location update served"
                );
                state.record(SimEvent::RequestServed {
                    time: now,
                    couple: request.owner_index,
                    origin: request.origin,
                    sequence: request.sequence_number,
                    applied,
                });
            }
            serve_next_request(state, sched);
        }
        ServerState::ServingSource => {
            if let Some(request) = state.server.current_request().copied() {
                state.record(SimEvent::RequestServed {
                    time: now,
                    couple: request.owner_index,
                    origin: request.origin,
                    sequence: request.sequence_number,
                    applied: true,
                });
            }
            match state.server.begin_reply(now) {
                Some(site) => {
                    debug!(site, "query served, sending reply");
                    sched.arm_sampled(
                        state.server.timer_mut(),
                        RateParameter::ServerReply,
                        REPLY_LABEL,
                    );
                }
                None => {
                    warn!("query service ended without a current request");
                    serve_next_request(state, sched);
                }
            }
        }
        ServerState::SendingReply => {
            if let Some((couple, site)) = state.server.complete_reply(now) {
                state.record(SimEvent::ServerReplied {
                    time: now,
                    couple,
                    site,
                });
                if state.sources[couple].state() == SourceState::WaitingServer {
                    let target = state.sources[couple].server_reply(site, now);
                    state.chains[couple].start_communication(target, sched);
                } else {
                    warn!(couple, "server reply for a source that is not waiting");
                }
            }
            serve_next_request(state, sched);
        }
        ServerState::Idle => warn!("unexpected server timer while idle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            couples: 0,
            ..Default::default()
        };
        assert_eq!(
            Orchestrator::new(config).err(),
            Some(SimulationError::InvalidConfig(ConfigError::NoCouples))
        );
    }

    #[test]
    fn test_initial_timers_armed() {
        let config = SimulationConfig {
            couples: 3,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(config).unwrap();
        assert_eq!(orchestrator.calendar().len(), 6);
        for couple in 0..3 {
            assert_eq!(orchestrator.calendar().pending_for(EntityRef::Agent(couple)), 1);
            assert_eq!(orchestrator.calendar().pending_for(EntityRef::Source(couple)), 1);
        }
    }

    #[test]
    fn test_step_after_finish_is_noop() {
        let config = SimulationConfig {
            run_length: 100.0,
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(config).unwrap();
        orchestrator.run().unwrap();
        assert!(orchestrator.is_finished());
        assert_eq!(orchestrator.now(), SimTime::from_millis(100.0));

        let result = orchestrator.step().unwrap();
        assert!(result.finished);
        assert_eq!(result.num_events, 0);
    }
}
