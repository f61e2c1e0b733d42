//! Duration generators, one exponential stream per rate parameter.
//!
//! Every generator is built once, when the simulation is initialized, from a
//! single seeded root. Each parameter draws from its own stream so adding a
//! draw for one parameter never shifts the samples of another.

use crate::orchestrator::config::Rates;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The named rate parameters of the model (all in events per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateParameter {
    /// λ: source inter-attempt wait
    Arrival,
    /// ν: agent time on site
    Wait,
    /// δ: agent migration
    Migration,
    /// γ1: one-hop communication
    HopCommunication,
    /// γ2: server reply communication
    ServerReply,
    /// μ1: server service of a location update
    AgentService,
    /// μ2: server service of a source query
    SourceService,
    /// α: forwarder lifetime
    ForwarderLifetime,
}

impl RateParameter {
    /// All parameters, in the order their streams are forked from the root
    pub const ALL: [RateParameter; 8] = [
        RateParameter::Arrival,
        RateParameter::Wait,
        RateParameter::Migration,
        RateParameter::HopCommunication,
        RateParameter::ServerReply,
        RateParameter::AgentService,
        RateParameter::SourceService,
        RateParameter::ForwarderLifetime,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RateParameter::Arrival => "lambda",
            RateParameter::Wait => "nu",
            RateParameter::Migration => "delta",
            RateParameter::HopCommunication => "gamma1",
            RateParameter::ServerReply => "gamma2",
            RateParameter::AgentService => "mu1",
            RateParameter::SourceService => "mu2",
            RateParameter::ForwarderLifetime => "alpha",
        }
    }
}

impl fmt::Display for RateParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An exponential duration generator bound to one rate
#[derive(Debug, Clone)]
pub struct ExponentialGenerator {
    rate: f64,
    rng: RngManager,
    samples: u64,
}

impl ExponentialGenerator {
    pub fn new(rate: f64, rng: RngManager) -> Self {
        Self {
            rate,
            rng,
            samples: 0,
        }
    }

    /// Next duration in milliseconds
    pub fn sample(&mut self) -> f64 {
        self.samples += 1;
        self.rng.exponential(self.rate)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Number of durations drawn so far
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// All duration generators of a run
///
/// # Example
/// ```
/// use location_simulator_core_rs::rng::{DurationGenerators, RateParameter};
/// use location_simulator_core_rs::orchestrator::config::Rates;
///
/// let mut generators = DurationGenerators::new(42, &Rates::default(), Some(5.0));
/// let wait = generators.sample(RateParameter::Wait);
/// assert!(wait >= 0.0);
/// assert_eq!(generators.samples(RateParameter::Wait), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DurationGenerators {
    generators: Vec<Option<ExponentialGenerator>>,
}

impl DurationGenerators {
    /// Build every generator from one root seed.
    ///
    /// `lifetime_rate` is `None` when forwarder lifetimes are not
    /// exponential; its stream is still forked so the other streams do not
    /// depend on the lifetime model.
    pub fn new(seed: u64, rates: &Rates, lifetime_rate: Option<f64>) -> Self {
        let mut root = RngManager::new(seed);
        let generators = RateParameter::ALL
            .iter()
            .map(|&parameter| {
                let stream = root.fork();
                let rate = match parameter {
                    RateParameter::Arrival => Some(rates.arrival),
                    RateParameter::Wait => Some(rates.wait),
                    RateParameter::Migration => Some(rates.migration),
                    RateParameter::HopCommunication => Some(rates.hop_communication),
                    RateParameter::ServerReply => Some(rates.server_reply),
                    RateParameter::AgentService => Some(rates.agent_service),
                    RateParameter::SourceService => Some(rates.source_service),
                    RateParameter::ForwarderLifetime => lifetime_rate,
                };
                rate.map(|rate| ExponentialGenerator::new(rate, stream))
            })
            .collect();
        Self { generators }
    }

    /// Draw the next duration for `parameter`
    ///
    /// # Panics
    /// Panics if the parameter has no generator; only the forwarder lifetime
    /// can be absent, and it is only sampled for exponential lifetimes.
    pub fn sample(&mut self, parameter: RateParameter) -> f64 {
        match self.generators[parameter.index()].as_mut() {
            Some(generator) => generator.sample(),
            None => panic!("no generator configured for {}", parameter),
        }
    }

    pub fn samples(&self, parameter: RateParameter) -> u64 {
        self.generators[parameter.index()]
            .as_ref()
            .map(ExponentialGenerator::samples)
            .unwrap_or(0)
    }

    pub fn rate(&self, parameter: RateParameter) -> Option<f64> {
        self.generators[parameter.index()]
            .as_ref()
            .map(ExponentialGenerator::rate)
    }
}
