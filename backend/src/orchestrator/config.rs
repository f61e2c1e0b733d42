//! Simulation configuration
//!
//! One immutable struct carries every parameter and feature switch of a run.
//! It is validated once, before any entity is built.
//!
//! All rates are events per second; all durations are virtual milliseconds.

use crate::stats::path::PathState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a [`SimulationConfig`]
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("rate {parameter} must be positive and finite, got {value}")]
    NonPositiveRate { parameter: &'static str, value: f64 },

    #[error("at least one couple is required")]
    NoCouples,

    #[error("max_migrations_before_update must be at least 1")]
    ZeroMigrationPeriod,

    #[error("run_length must be positive and finite, got {0}")]
    NonPositiveRunLength(f64),

    #[error("forwarder ttl must be positive and finite, got {0}")]
    NonPositiveTtl(f64),

    #[error("max_time_on_site must be positive and finite, got {0}")]
    NonPositiveTimeOnSite(f64),

    #[error("invalid adaptive ttl: {0}")]
    InvalidAdaptiveTtl(String),

    #[error("reference path {index} is empty")]
    EmptyReferencePath { index: usize },
}

/// Rate parameters of the model (events per second)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rates {
    /// λ: source attempts
    pub arrival: f64,
    /// ν: end of the agent's stay on a site
    pub wait: f64,
    /// δ: migration completion
    pub migration: f64,
    /// γ1: one-hop communication
    pub hop_communication: f64,
    /// γ2: server reply communication
    pub server_reply: f64,
    /// μ1: server service of agent and forwarder updates
    pub agent_service: f64,
    /// μ2: server service of source queries
    pub source_service: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            arrival: 1.0,
            wait: 2.0,
            migration: 10.0,
            hop_communication: 50.0,
            server_reply: 50.0,
            agent_service: 100.0,
            source_service: 100.0,
        }
    }
}

impl Rates {
    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("lambda", self.arrival),
            ("nu", self.wait),
            ("delta", self.migration),
            ("gamma1", self.hop_communication),
            ("gamma2", self.server_reply),
            ("mu1", self.agent_service),
            ("mu2", self.source_service),
        ]
    }
}

/// How long a forwarder stays alive once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwarderLifetime {
    /// Lifetime drawn from an exponential distribution with rate α
    Exponential { alpha: f64 },
    /// Every forwarder lives exactly `ttl` milliseconds
    Fixed { ttl: f64 },
    /// Forwarders never expire
    Infinite,
}

/// Bound on how long the agent stays on one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OnSitePolicy {
    Unbounded,
    Capped { max_time_on_site: f64 },
}

impl OnSitePolicy {
    /// Apply the policy to a sampled wait duration
    pub fn wait_duration(&self, sampled: f64) -> f64 {
        match self {
            OnSitePolicy::Unbounded => sampled,
            OnSitePolicy::Capped { max_time_on_site } => sampled.min(*max_time_on_site),
        }
    }
}

/// Queueing discipline of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// One queue shared by every couple, oldest request first
    SingleQueue,
    /// One queue per couple, served round-robin
    PerCouple,
}

/// Per-couple lifetime multiplier that reacts to traversal outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveTtl {
    /// Relative change applied on every failure (growth) or success (decay)
    pub step: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for AdaptiveTtl {
    fn default() -> Self {
        Self {
            step: 0.1,
            min_multiplier: 1.0,
            max_multiplier: 4.0,
        }
    }
}

/// Complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rates: Rates,

    pub forwarder_lifetime: ForwarderLifetime,

    /// The agent reports to the server after every N-th migration
    pub max_migrations_before_update: u64,

    /// Number of (source, agent, chain) couples
    pub couples: usize,

    /// Virtual run length in milliseconds
    pub run_length: f64,

    pub on_site: OnSitePolicy,

    /// Root seed of every random stream
    pub seed: u64,

    pub server_mode: ServerMode,

    /// Whether the agent ever reports its location to the server
    pub agent_calls_server: bool,

    /// Whether new forwarders start alive (false: born dead)
    pub forwarders_born_alive: bool,

    /// Whether an expiring forwarder reports its last hop to the server
    pub forwarder_calls_server: bool,

    /// Adaptive forwarder lifetime; `None` disables it
    pub adaptive_ttl: Option<AdaptiveTtl>,

    /// Reference state sequences for path analysis; empty disables it
    pub reference_paths: Vec<Vec<PathState>>,

    /// Keep a log of protocol events (memory grows with the run)
    pub record_events: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rates: Rates::default(),
            forwarder_lifetime: ForwarderLifetime::Exponential { alpha: 0.5 },
            max_migrations_before_update: 3,
            couples: 1,
            run_length: 60_000.0,
            on_site: OnSitePolicy::Unbounded,
            seed: 12345,
            server_mode: ServerMode::PerCouple,
            agent_calls_server: true,
            forwarders_born_alive: true,
            forwarder_calls_server: true,
            adaptive_ttl: None,
            reference_paths: Vec::new(),
            record_events: false,
        }
    }
}

impl SimulationConfig {
    /// Check every parameter; called before the simulation is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (parameter, value) in self.rates.named() {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveRate { parameter, value });
            }
        }

        match self.forwarder_lifetime {
            ForwarderLifetime::Exponential { alpha } if !(alpha.is_finite() && alpha > 0.0) => {
                return Err(ConfigError::NonPositiveRate {
                    parameter: "alpha",
                    value: alpha,
                });
            }
            ForwarderLifetime::Fixed { ttl } if !(ttl.is_finite() && ttl > 0.0) => {
                return Err(ConfigError::NonPositiveTtl(ttl));
            }
            _ => {}
        }

        if self.couples == 0 {
            return Err(ConfigError::NoCouples);
        }

        if self.max_migrations_before_update == 0 {
            return Err(ConfigError::ZeroMigrationPeriod);
        }

        if !(self.run_length.is_finite() && self.run_length > 0.0) {
            return Err(ConfigError::NonPositiveRunLength(self.run_length));
        }

        if let OnSitePolicy::Capped { max_time_on_site } = self.on_site {
            if !(max_time_on_site.is_finite() && max_time_on_site > 0.0) {
                return Err(ConfigError::NonPositiveTimeOnSite(max_time_on_site));
            }
        }

        if let Some(adaptive) = &self.adaptive_ttl {
            if !(adaptive.step.is_finite() && adaptive.step > 0.0) {
                return Err(ConfigError::InvalidAdaptiveTtl(format!(
                    "step must be positive, got {}",
                    adaptive.step
                )));
            }
            if !(adaptive.min_multiplier > 0.0 && adaptive.min_multiplier <= adaptive.max_multiplier)
            {
                return Err(ConfigError::InvalidAdaptiveTtl(format!(
                    "bounds [{}, {}] are not a positive range",
                    adaptive.min_multiplier, adaptive.max_multiplier
                )));
            }
        }

        if let Some(index) = self.reference_paths.iter().position(Vec::is_empty) {
            return Err(ConfigError::EmptyReferencePath { index });
        }

        Ok(())
    }

    /// Rate of the lifetime generator, when lifetimes are exponential
    pub fn lifetime_rate(&self) -> Option<f64> {
        match self.forwarder_lifetime {
            ForwarderLifetime::Exponential { alpha } => Some(alpha),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_rate() {
        let mut config = SimulationConfig::default();
        config.rates.migration = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveRate {
                parameter: "delta",
                value: 0.0
            })
        );
    }

    #[test]
    fn test_rejects_nan_run_length() {
        let config = SimulationConfig {
            run_length: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveRunLength(_))
        ));
    }

    #[test]
    fn test_rejects_zero_couples_and_period() {
        let config = SimulationConfig {
            couples: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoCouples));

        let config = SimulationConfig {
            max_migrations_before_update: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMigrationPeriod));
    }

    #[test]
    fn test_rejects_bad_ttl() {
        let config = SimulationConfig {
            forwarder_lifetime: ForwarderLifetime::Fixed { ttl: -1.0 },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTtl(-1.0)));
    }

    #[test]
    fn test_capped_wait_duration() {
        let policy = OnSitePolicy::Capped {
            max_time_on_site: 300.0,
        };
        assert_eq!(policy.wait_duration(120.0), 120.0);
        assert_eq!(policy.wait_duration(900.0), 300.0);
        assert_eq!(OnSitePolicy::Unbounded.wait_duration(900.0), 900.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "couples": 4,
            "server_mode": "single_queue",
            "forwarder_lifetime": {"type": "infinite"},
            "rates": {"arrival": 3.0}
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.couples, 4);
        assert_eq!(config.server_mode, ServerMode::SingleQueue);
        assert_eq!(config.forwarder_lifetime, ForwarderLifetime::Infinite);
        assert_eq!(config.rates.arrival, 3.0);
        assert_eq!(config.rates.wait, Rates::default().wait);
        assert_eq!(config.lifetime_rate(), None);
    }
}
