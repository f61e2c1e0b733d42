//! Forwarder chain
//!
//! The chain owns every forwarder of one couple (oldest site first) and the
//! message currently travelling along them on behalf of the source.
//!
//! # Traversal
//!
//! A message is sent one hop at a time. When it lands on its target site:
//!
//! 1. a live forwarder at the target relays it to `target + 1`;
//! 2. the agent sits on the target: the message is delivered. If it was
//!    relayed at least once and the agent is still waiting on site, the
//!    chain first tensions (holds the agent for one extra hop time);
//! 3. the agent is leaving the target and has not installed its forwarder
//!    yet: the message waits for it;
//! 4. anything else (dead or flushed forwarder, unknown site) fails.
//!
//! # Critical Invariants
//!
//! 1. Success and failure both flush every forwarder and cancel its timer,
//!    so no entry is reused by the next traversal
//! 2. Failure is reported exactly once
//! 3. A dead forwarder never relays a message

use crate::core::calendar::{EntityRef, EventKey};
use crate::core::entity::{Scheduler, SimulationEntity, Timer};
use crate::core::time::SimTime;
use crate::models::forwarder::{Forwarder, ForwarderState};
use crate::rng::RateParameter;
use serde::{Deserialize, Serialize};

pub const HOP_LABEL: &str = "hop";
pub const TENSION_LABEL: &str = "tension";
pub const EXPIRE_LABEL: &str = "expire";
pub const FORWARDER_UPDATE_LABEL: &str = "forwarder_update";

/// Discrete state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainState {
    Idle,
    /// A message is in flight
    Communicating,
    /// Message parked at the site the agent is leaving
    WaitingAgent,
    /// Message delivered; agent held on site for one more hop time
    Tensioning,
}

/// What the chain needs to know about its agent when a message lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPosition {
    /// Current site number
    pub site: u64,
    /// On site: waiting, blocked, or reporting from the new site
    pub on_site: bool,
    /// In the plain waiting state (can still decide to migrate)
    pub waiting: bool,
    /// Site being left whose forwarder is not installed yet
    pub pending_site: Option<u64>,
}

/// Result of a chain transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    /// A forwarder at `from_site` relayed the message
    Forwarded { from_site: u64 },
    /// Message delivered after forwarding; the agent must stay on site
    Tensioning { site: u64 },
    /// Message waits at `site` for the agent's forwarder
    WaitingAgent { site: u64 },
    Reached { site: u64, hops: u32 },
    Failed { target: u64, hops: u32 },
}

/// The message in flight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Traversal {
    pub target: u64,
    pub hops: u32,
    pub has_been_forwarded: bool,
    pub started_at: SimTime,
}

#[derive(Debug, Clone)]
pub struct Chain {
    couple: usize,
    forwarders: Vec<Forwarder>,
    state: ChainState,
    traversal: Option<Traversal>,
    timer: Timer,
    /// Forwarders removed by flushes over the run
    released: u64,
}

impl Chain {
    pub fn new(couple: usize) -> Self {
        Self {
            couple,
            forwarders: Vec::new(),
            state: ChainState::Idle,
            traversal: None,
            timer: Timer::new(EntityRef::Chain(couple)),
            released: 0,
        }
    }

    pub fn couple(&self) -> usize {
        self.couple
    }

    pub fn traversal(&self) -> Option<&Traversal> {
        self.traversal.as_ref()
    }

    pub fn forwarders(&self) -> &[Forwarder] {
        &self.forwarders
    }

    pub fn forwarder(&self, site: u64) -> Option<&Forwarder> {
        self.index_of(site).map(|index| &self.forwarders[index])
    }

    /// Number of forwarders currently relaying messages
    pub fn live_forwarders(&self) -> usize {
        self.forwarders.iter().filter(|f| f.is_live()).count()
    }

    pub fn released(&self) -> u64 {
        self.released
    }

    fn index_of(&self, site: u64) -> Option<usize> {
        self.forwarders
            .binary_search_by_key(&site, Forwarder::site)
            .ok()
    }

    /// Start a traversal towards `target`, the source's best guess.
    pub fn start_communication(&mut self, target: u64, sched: &mut Scheduler<'_>) {
        self.traversal = Some(Traversal {
            target,
            hops: 0,
            has_been_forwarded: false,
            started_at: sched.now(),
        });
        self.state = ChainState::Communicating;
        self.send_hop(sched);
    }

    fn send_hop(&mut self, sched: &mut Scheduler<'_>) {
        if let Some(traversal) = self.traversal.as_mut() {
            traversal.hops += 1;
        }
        sched.arm_sampled(&mut self.timer, RateParameter::HopCommunication, HOP_LABEL);
    }

    /// The chain timer fired.
    ///
    /// Returns `None` if the chain was not waiting for a timer.
    pub fn on_timer(
        &mut self,
        agent: AgentPosition,
        sched: &mut Scheduler<'_>,
    ) -> Option<HopOutcome> {
        match self.state {
            ChainState::Communicating => Some(self.on_hop_landed(agent, sched)),
            ChainState::Tensioning => Some(self.succeed(sched)),
            ChainState::Idle | ChainState::WaitingAgent => None,
        }
    }

    fn on_hop_landed(&mut self, agent: AgentPosition, sched: &mut Scheduler<'_>) -> HopOutcome {
        let Some(traversal) = self.traversal else {
            return self.fail(sched);
        };
        let target = traversal.target;

        if let Some(forwarder) = self.forwarder(target) {
            if forwarder.is_live() {
                return self.forward(target, sched);
            }
            return self.fail(sched);
        }

        if agent.site == target && agent.on_site {
            if agent.waiting && traversal.has_been_forwarded {
                self.state = ChainState::Tensioning;
                sched.arm_sampled(
                    &mut self.timer,
                    RateParameter::HopCommunication,
                    TENSION_LABEL,
                );
                return HopOutcome::Tensioning { site: target };
            }
            return self.succeed(sched);
        }

        if agent.pending_site == Some(target) {
            self.state = ChainState::WaitingAgent;
            return HopOutcome::WaitingAgent { site: target };
        }

        self.fail(sched)
    }

    fn forward(&mut self, from_site: u64, sched: &mut Scheduler<'_>) -> HopOutcome {
        if let Some(traversal) = self.traversal.as_mut() {
            traversal.has_been_forwarded = true;
            traversal.target = from_site + 1;
        }
        self.state = ChainState::Communicating;
        self.send_hop(sched);
        HopOutcome::Forwarded { from_site }
    }

    fn succeed(&mut self, sched: &mut Scheduler<'_>) -> HopOutcome {
        let (site, hops) = self
            .traversal
            .take()
            .map(|t| (t.target, t.hops))
            .unwrap_or_default();
        self.flush(sched);
        self.state = ChainState::Idle;
        HopOutcome::Reached { site, hops }
    }

    fn fail(&mut self, sched: &mut Scheduler<'_>) -> HopOutcome {
        let (target, hops) = self
            .traversal
            .take()
            .map(|t| (t.target, t.hops))
            .unwrap_or_default();
        self.flush(sched);
        self.state = ChainState::Idle;
        HopOutcome::Failed { target, hops }
    }

    /// Release every forwarder and cancel its pending timer.
    pub fn flush(&mut self, sched: &mut Scheduler<'_>) -> usize {
        let released = self.forwarders.len();
        for mut forwarder in self.forwarders.drain(..) {
            sched.disarm(forwarder.timer_mut());
        }
        self.released += released as u64;
        released
    }

    /// Append the forwarder the agent left at `site`.
    ///
    /// `lifetime` is `None` for forwarders that never expire. A message
    /// parked at `site` resumes from the new forwarder, or fails if it was
    /// born dead.
    pub fn install_forwarder(
        &mut self,
        site: u64,
        alive: bool,
        lifetime: Option<f64>,
        sched: &mut Scheduler<'_>,
    ) -> Option<HopOutcome> {
        let mut forwarder = Forwarder::new(self.couple, site, alive, sched.now());
        if alive {
            if let Some(lifetime) = lifetime {
                sched.arm(forwarder.timer_mut(), lifetime, EXPIRE_LABEL);
            }
        }
        let position = self
            .forwarders
            .partition_point(|existing| existing.site() < site);
        self.forwarders.insert(position, forwarder);

        let parked_here = self.state == ChainState::WaitingAgent
            && self.traversal.map(|t| t.target) == Some(site);
        if !parked_here {
            return None;
        }
        Some(if alive {
            self.forward(site, sched)
        } else {
            self.fail(sched)
        })
    }

    /// Consume a fired forwarder event. False when the forwarder is gone or
    /// the event is stale.
    pub fn fire_forwarder(&mut self, site: u64, key: EventKey) -> bool {
        match self.index_of(site) {
            Some(index) => self.forwarders[index].timer_mut().fire(key),
            None => false,
        }
    }

    /// Lifetime of the forwarder at `site` ran out; returns its new state
    pub fn expire_forwarder(
        &mut self,
        site: u64,
        calls_server: bool,
        sched: &mut Scheduler<'_>,
    ) -> Option<ForwarderState> {
        let index = self.index_of(site)?;
        let forwarder = &mut self.forwarders[index];
        let state = forwarder.expire(calls_server);
        if state == ForwarderState::UpdatingServer {
            sched.arm_sampled(
                forwarder.timer_mut(),
                RateParameter::HopCommunication,
                FORWARDER_UPDATE_LABEL,
            );
        }
        Some(state)
    }

    /// The expiring forwarder's report reached the server.
    ///
    /// Returns the last hop it knew of, for the server request.
    pub fn finish_forwarder_update(&mut self, site: u64) -> Option<u64> {
        let index = self.index_of(site)?;
        let forwarder = &mut self.forwarders[index];
        forwarder.finish_update();
        Some(forwarder.next_site())
    }
}

impl SimulationEntity for Chain {
    type State = ChainState;

    fn state(&self) -> ChainState {
        self.state
    }

    fn timer(&self) -> &Timer {
        &self.timer
    }

    fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::Calendar;
    use crate::orchestrator::config::Rates;
    use crate::rng::DurationGenerators;

    fn agent_at(site: u64) -> AgentPosition {
        AgentPosition {
            site,
            on_site: true,
            waiting: false,
            pending_site: None,
        }
    }

    #[test]
    fn test_flush_releases_everything() {
        let mut calendar = Calendar::new();
        let mut generators = DurationGenerators::new(1, &Rates::default(), None);
        let mut sched = Scheduler::new(&mut calendar, &mut generators, SimTime::ZERO);

        let mut chain = Chain::new(0);
        chain.install_forwarder(1, true, Some(50.0), &mut sched);
        chain.install_forwarder(2, false, Some(50.0), &mut sched);
        chain.install_forwarder(3, true, Some(50.0), &mut sched);
        assert_eq!(sched.calendar().len(), 2);

        assert_eq!(chain.flush(&mut sched), 3);
        assert!(chain.forwarders().is_empty());
        assert!(sched.calendar().is_empty());

        chain.install_forwarder(4, true, None, &mut sched);
        assert_eq!(chain.flush(&mut sched), 1);
        assert_eq!(chain.released(), 4);
    }

    #[test]
    fn test_direct_delivery_is_one_hop() {
        let mut calendar = Calendar::new();
        let mut generators = DurationGenerators::new(1, &Rates::default(), None);
        let mut sched = Scheduler::new(&mut calendar, &mut generators, SimTime::ZERO);

        let mut chain = Chain::new(0);
        chain.start_communication(5, &mut sched);
        let outcome = chain.on_timer(agent_at(5), &mut sched);

        assert_eq!(outcome, Some(HopOutcome::Reached { site: 5, hops: 1 }));
        assert_eq!(chain.state(), ChainState::Idle);
    }

    #[test]
    fn test_message_waits_for_departing_agent() {
        let mut calendar = Calendar::new();
        let mut generators = DurationGenerators::new(1, &Rates::default(), None);
        let mut sched = Scheduler::new(&mut calendar, &mut generators, SimTime::ZERO);

        let mut chain = Chain::new(0);
        chain.start_communication(2, &mut sched);
        let leaving = AgentPosition {
            site: 3,
            on_site: false,
            waiting: false,
            pending_site: Some(2),
        };
        assert_eq!(
            chain.on_timer(leaving, &mut sched),
            Some(HopOutcome::WaitingAgent { site: 2 })
        );
        assert_eq!(chain.state(), ChainState::WaitingAgent);

        let resumed = chain.install_forwarder(2, true, None, &mut sched);
        assert_eq!(resumed, Some(HopOutcome::Forwarded { from_site: 2 }));
        assert_eq!(chain.traversal().map(|t| t.target), Some(3));
        assert_eq!(chain.traversal().map(|t| t.hops), Some(2));
    }

    #[test]
    fn test_parked_message_fails_on_dead_forwarder() {
        let mut calendar = Calendar::new();
        let mut generators = DurationGenerators::new(1, &Rates::default(), None);
        let mut sched = Scheduler::new(&mut calendar, &mut generators, SimTime::ZERO);

        let mut chain = Chain::new(0);
        chain.start_communication(0, &mut sched);
        let leaving = AgentPosition {
            site: 1,
            on_site: false,
            waiting: false,
            pending_site: Some(0),
        };
        chain.on_timer(leaving, &mut sched);

        let outcome = chain.install_forwarder(0, false, None, &mut sched);
        assert_eq!(outcome, Some(HopOutcome::Failed { target: 0, hops: 1 }));
        assert!(chain.forwarders().is_empty());
    }
}
