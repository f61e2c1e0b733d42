//! Simulation report
//!
//! Aggregates the running statistics of every entity into one serializable
//! value. Rates are derived as `1000 / average duration` (events per second),
//! so a long enough run recovers the configured rates.
//!
//! The report carries a SHA-256 fingerprint of the configuration so two
//! reports can be compared for reproducibility.

use crate::core::time::SimTime;
use crate::models::agent::AgentStats;
use crate::models::source::SourceStats;
use crate::models::state::SimulationState;
use crate::orchestrator::config::ServerMode;
use crate::orchestrator::engine::SimulationError;
use crate::stats::{PathSummary, PathTracker};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Compute SHA256 hash of configuration
///
/// Uses canonical JSON serialization with sorted keys to ensure
/// deterministic hashing regardless of field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    // Recursively sort all object keys for canonical representation
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Statistics of one couple, or of all couples merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupleReport {
    /// `None` for the aggregate over all couples
    pub couple: Option<usize>,

    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Broken traversals over all traversals
    pub failure_probability: Option<f64>,
    /// Mean attempt latency (ms)
    pub mean_latency: Option<f64>,
    pub mean_tries: Option<f64>,
    pub mean_hops: Option<f64>,
    /// Mean time a source waited for the server (ms)
    pub mean_server_wait: Option<f64>,

    pub migrations: u64,
    pub location_updates: u64,
    pub mean_time_on_site: Option<f64>,
    pub mean_blocked_time: Option<f64>,

    /// Estimated λ
    pub arrival_rate: Option<f64>,
    /// Estimated ν
    pub wait_rate: Option<f64>,
    /// Estimated δ
    pub migration_rate: Option<f64>,
    /// Estimated γ1, from agent location updates
    pub hop_rate: Option<f64>,

    pub live_forwarders: usize,
    pub forwarders_released: u64,
    pub ttl_multiplier: f64,
}

impl CoupleReport {
    fn from_stats(couple: Option<usize>, source: &SourceStats, agent: &AgentStats) -> Self {
        Self {
            couple,
            attempts: source.attempts,
            successes: source.successes,
            failures: source.failures,
            failure_probability: source.failure.average(),
            mean_latency: source.latency.average(),
            mean_tries: source.tries.average(),
            mean_hops: source.hops.average(),
            mean_server_wait: source.server_wait_time.average(),
            migrations: agent.migration_time.count(),
            location_updates: agent.location_updates,
            mean_time_on_site: agent.on_site_time.average(),
            mean_blocked_time: agent.blocked_time.average(),
            arrival_rate: source.interarrival_time.rate_per_second(),
            wait_rate: agent.wait_time.rate_per_second(),
            migration_rate: agent.migration_time.rate_per_second(),
            hop_rate: agent.server_call_time.rate_per_second(),
            live_forwarders: 0,
            forwarders_released: 0,
            ttl_multiplier: 1.0,
        }
    }
}

/// Server statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerReport {
    pub mode: ServerMode,
    pub agent_updates_served: u64,
    pub forwarder_updates_served: u64,
    pub queries_served: u64,
    pub superseded: u64,
    pub dropped_on_arrival: u64,
    pub stale_updates_discarded: u64,
    /// Requests still queued
    pub queued: usize,
    pub mean_queueing_delay: Option<f64>,
    pub mean_agent_queueing_delay: Option<f64>,
    pub mean_source_queueing_delay: Option<f64>,
    /// Estimated μ1
    pub agent_service_rate: Option<f64>,
    /// Estimated μ2
    pub source_service_rate: Option<f64>,
    /// Estimated γ2
    pub reply_rate: Option<f64>,
    /// Busy time over elapsed time
    pub utilization: f64,
}

/// Complete report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config_hash: String,
    pub seed: u64,
    /// Virtual milliseconds simulated
    pub elapsed: f64,
    pub batches: u64,
    pub events_dispatched: u64,
    pub stale_events: u64,
    pub couples: Vec<CoupleReport>,
    pub aggregate: CoupleReport,
    pub server: ServerReport,
    /// One entry per reference path; empty when path analysis is off
    pub paths: Vec<PathSummary>,
    pub completed_trajectories: u64,
    pub unmatched_trajectories: u64,
}

impl SimulationReport {
    pub(crate) fn build(
        state: &SimulationState,
        paths: &PathTracker,
        config_hash: &str,
        elapsed: f64,
        batches: u64,
        events_dispatched: u64,
    ) -> Self {
        let mut all_sources = SourceStats::default();
        let mut all_agents = AgentStats::default();
        let mut couples = Vec::with_capacity(state.num_couples());

        for couple in 0..state.num_couples() {
            let source = state.sources()[couple].stats();
            let agent = state.agents()[couple].stats();
            let chain = &state.chains()[couple];
            all_sources.merge(source);
            all_agents.merge(agent);

            let mut report = CoupleReport::from_stats(Some(couple), source, agent);
            report.live_forwarders = chain.live_forwarders();
            report.forwarders_released = chain.released();
            report.ttl_multiplier = state.ttl_multiplier(couple);
            couples.push(report);
        }

        let mut aggregate = CoupleReport::from_stats(None, &all_sources, &all_agents);
        aggregate.live_forwarders = couples.iter().map(|c| c.live_forwarders).sum();
        aggregate.forwarders_released = couples.iter().map(|c| c.forwarders_released).sum();
        if !couples.is_empty() {
            aggregate.ttl_multiplier =
                couples.iter().map(|c| c.ttl_multiplier).sum::<f64>() / couples.len() as f64;
        }

        let server = state.server();
        let stats = server.stats();
        let end = SimTime::from_millis(elapsed);
        let utilization = if elapsed > 0.0 {
            server.busy_time_until(end) / elapsed
        } else {
            0.0
        };

        Self {
            config_hash: config_hash.to_string(),
            seed: state.config().seed,
            elapsed,
            batches,
            events_dispatched,
            stale_events: state.stale_events(),
            couples,
            aggregate,
            server: ServerReport {
                mode: server.mode(),
                agent_updates_served: stats.agent_updates_served,
                forwarder_updates_served: stats.forwarder_updates_served,
                queries_served: stats.queries_served,
                superseded: stats.superseded,
                dropped_on_arrival: stats.dropped_on_arrival,
                stale_updates_discarded: stats.stale_updates_discarded,
                queued: server.queued(),
                mean_queueing_delay: stats.queueing_delay.average(),
                mean_agent_queueing_delay: stats.agent_queueing_delay.average(),
                mean_source_queueing_delay: stats.source_queueing_delay.average(),
                agent_service_rate: stats.agent_service_time.rate_per_second(),
                source_service_rate: stats.source_service_time.rate_per_second(),
                reply_rate: stats.reply_time.rate_per_second(),
                utilization,
            },
            paths: paths.summaries(),
            completed_trajectories: paths.completed(),
            unmatched_trajectories: paths.unmatched(),
        }
    }

    /// Pretty JSON form of the report
    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimulationError::SerializationError(e.to_string()))
    }
}

struct Opt(Option<f64>);

impl fmt::Display for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{:.4}", value),
            None => write!(f, "n/a"),
        }
    }
}

impl fmt::Display for CoupleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.couple {
            Some(couple) => writeln!(f, "Couple {}", couple)?,
            None => writeln!(f, "All couples")?,
        }
        writeln!(f, "  Source")?;
        writeln!(
            f,
            "    attempts {}  successes {}  failures {}",
            self.attempts, self.successes, self.failures
        )?;
        writeln!(f, "    failure probability  {}", Opt(self.failure_probability))?;
        writeln!(f, "    mean latency (ms)    {}", Opt(self.mean_latency))?;
        writeln!(f, "    mean tries           {}", Opt(self.mean_tries))?;
        writeln!(f, "    mean hops            {}", Opt(self.mean_hops))?;
        writeln!(f, "    mean server wait     {}", Opt(self.mean_server_wait))?;
        writeln!(f, "    lambda               {}", Opt(self.arrival_rate))?;
        writeln!(f, "  Agent")?;
        writeln!(
            f,
            "    migrations {}  location updates {}",
            self.migrations, self.location_updates
        )?;
        writeln!(f, "    mean time on site    {}", Opt(self.mean_time_on_site))?;
        writeln!(f, "    mean blocked time    {}", Opt(self.mean_blocked_time))?;
        writeln!(f, "    nu                   {}", Opt(self.wait_rate))?;
        writeln!(f, "    delta                {}", Opt(self.migration_rate))?;
        writeln!(f, "    gamma1               {}", Opt(self.hop_rate))?;
        writeln!(f, "  Chain")?;
        writeln!(
            f,
            "    live forwarders {}  released {}  ttl multiplier {:.3}",
            self.live_forwarders, self.forwarders_released, self.ttl_multiplier
        )
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation report")?;
        writeln!(f, "  config hash  {}", self.config_hash)?;
        writeln!(f, "  seed         {}", self.seed)?;
        writeln!(f, "  elapsed (ms) {:.1}", self.elapsed)?;
        writeln!(
            f,
            "  batches {}  events {}  stale {}",
            self.batches, self.events_dispatched, self.stale_events
        )?;
        writeln!(f)?;

        for couple in &self.couples {
            write!(f, "{}", couple)?;
        }
        if self.couples.len() > 1 {
            write!(f, "{}", self.aggregate)?;
        }
        writeln!(f)?;

        let server = &self.server;
        writeln!(f, "Server ({:?})", server.mode)?;
        writeln!(
            f,
            "  served: agent {}  forwarder {}  queries {}",
            server.agent_updates_served, server.forwarder_updates_served, server.queries_served
        )?;
        writeln!(
            f,
            "  superseded {}  dropped {}  stale updates {}  queued {}",
            server.superseded,
            server.dropped_on_arrival,
            server.stale_updates_discarded,
            server.queued
        )?;
        writeln!(f, "  mean queueing delay  {}", Opt(server.mean_queueing_delay))?;
        writeln!(f, "  mu1                  {}", Opt(server.agent_service_rate))?;
        writeln!(f, "  mu2                  {}", Opt(server.source_service_rate))?;
        writeln!(f, "  gamma2               {}", Opt(server.reply_rate))?;
        writeln!(f, "  utilization          {:.4}", server.utilization)?;

        if !self.paths.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "Paths ({} trajectories, {} unmatched)",
                self.completed_trajectories, self.unmatched_trajectories
            )?;
            for (index, path) in self.paths.iter().enumerate() {
                writeln!(
                    f,
                    "  path {}: {} steps  hits {}  partial {}",
                    index,
                    path.states.len(),
                    path.hits,
                    path.partial_hits
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::config::SimulationConfig;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let hash1 = compute_config_hash(&SimulationConfig::default()).unwrap();
        let hash2 = compute_config_hash(&SimulationConfig::default()).unwrap();
        assert_eq!(hash1, hash2, "Same config should produce same hash");
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let config = SimulationConfig {
            seed: 99,
            ..Default::default()
        };
        assert_ne!(
            compute_config_hash(&config).unwrap(),
            compute_config_hash(&SimulationConfig::default()).unwrap()
        );
    }

    #[test]
    fn test_empty_state_report() {
        let state = SimulationState::new(SimulationConfig {
            couples: 2,
            ..Default::default()
        });
        let paths = PathTracker::new(&[], 2);
        let report = SimulationReport::build(&state, &paths, "abc", 0.0, 0, 0);

        assert_eq!(report.couples.len(), 2);
        assert_eq!(report.aggregate.couple, None);
        assert_eq!(report.aggregate.mean_latency, None);
        assert_eq!(report.server.utilization, 0.0);
        assert!(report.to_string().contains("All couples"));
    }
}
