//! Simulation State
//!
//! Every entity of a run, addressed by couple index: one agent, one source
//! and one forwarder chain per couple, plus the shared server. Entities never
//! hold references to each other; the driver looks them up here.
//!
//! # Critical Invariants
//!
//! 1. **Couple alignment**: `agents`, `sources`, `chains` and
//!    `ttl_multipliers` all have exactly `config.couples` entries
//! 2. **Single pending event**: each entity has at most one armed timer
//! 3. **Bounded multipliers**: adaptive lifetime multipliers stay within the
//!    configured bounds

use crate::models::agent::Agent;
use crate::models::chain::Chain;
use crate::models::event::{EventLog, SimEvent};
use crate::models::server::Server;
use crate::models::source::Source;
use crate::orchestrator::config::SimulationConfig;

/// Complete simulation state
///
/// # Example
///
/// ```rust
/// use location_simulator_core_rs::{SimulationConfig, SimulationState};
///
/// let config = SimulationConfig {
///     couples: 3,
///     ..Default::default()
/// };
/// let state = SimulationState::new(config);
/// assert_eq!(state.num_couples(), 3);
/// assert_eq!(state.ttl_multiplier(0), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct SimulationState {
    config: SimulationConfig,
    pub(crate) agents: Vec<Agent>,
    pub(crate) sources: Vec<Source>,
    pub(crate) chains: Vec<Chain>,
    pub(crate) server: Server,
    ttl_multipliers: Vec<f64>,
    event_log: EventLog,
    stale_events: u64,
}

impl SimulationState {
    /// Build every entity from a validated configuration
    pub fn new(config: SimulationConfig) -> Self {
        let couples = config.couples;
        let initial_multiplier = config
            .adaptive_ttl
            .as_ref()
            .map(|adaptive| 1.0_f64.clamp(adaptive.min_multiplier, adaptive.max_multiplier))
            .unwrap_or(1.0);

        Self {
            agents: (0..couples).map(|c| Agent::new(c, &config)).collect(),
            sources: (0..couples).map(Source::new).collect(),
            chains: (0..couples).map(Chain::new).collect(),
            server: Server::new(config.server_mode, couples),
            ttl_multipliers: vec![initial_multiplier; couples],
            event_log: EventLog::new(),
            stale_events: 0,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn num_couples(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, couple: usize) -> Option<&Agent> {
        self.agents.get(couple)
    }

    pub fn source(&self, couple: usize) -> Option<&Source> {
        self.sources.get(couple)
    }

    pub fn chain(&self, couple: usize) -> Option<&Chain> {
        self.chains.get(couple)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Current lifetime multiplier of `couple`'s forwarders
    pub fn ttl_multiplier(&self, couple: usize) -> f64 {
        self.ttl_multipliers.get(couple).copied().unwrap_or(1.0)
    }

    /// Grow the lifetime multiplier after a failure, shrink it after a
    /// success. No-op when adaptive lifetimes are disabled.
    pub fn adapt_ttl(&mut self, couple: usize, success: bool) {
        let Some(adaptive) = &self.config.adaptive_ttl else {
            return;
        };
        let factor = 1.0 + adaptive.step;
        let multiplier = &mut self.ttl_multipliers[couple];
        let next = if success {
            *multiplier / factor
        } else {
            *multiplier * factor
        };
        *multiplier = next.clamp(adaptive.min_multiplier, adaptive.max_multiplier);
    }

    /// Record a protocol event if event recording is on
    pub fn record(&mut self, event: SimEvent) {
        if self.config.record_events {
            self.event_log.log(event);
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    pub(crate) fn count_stale_event(&mut self) {
        self.stale_events += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::config::AdaptiveTtl;

    #[test]
    fn test_adapt_ttl_is_clamped() {
        let config = SimulationConfig {
            couples: 2,
            adaptive_ttl: Some(AdaptiveTtl {
                step: 1.0,
                min_multiplier: 1.0,
                max_multiplier: 4.0,
            }),
            ..Default::default()
        };
        let mut state = SimulationState::new(config);

        for _ in 0..5 {
            state.adapt_ttl(0, false);
        }
        assert_eq!(state.ttl_multiplier(0), 4.0);
        assert_eq!(state.ttl_multiplier(1), 1.0);

        state.adapt_ttl(0, true);
        assert_eq!(state.ttl_multiplier(0), 2.0);
        for _ in 0..5 {
            state.adapt_ttl(0, true);
        }
        assert_eq!(state.ttl_multiplier(0), 1.0);
    }

    #[test]
    fn test_adapt_ttl_disabled() {
        let mut state = SimulationState::new(SimulationConfig::default());
        state.adapt_ttl(0, false);
        assert_eq!(state.ttl_multiplier(0), 1.0);
    }

    #[test]
    fn test_events_not_recorded_by_default() {
        use crate::core::time::SimTime;

        let mut state = SimulationState::new(SimulationConfig::default());
        state.record(SimEvent::ForwarderExpired {
            time: SimTime::ZERO,
            couple: 0,
            site: 0,
        });
        assert!(state.event_log().is_empty());
    }
}
