//! Running statistics for measured quantities
//!
//! Durations, hop counts and booleans (as 0/1) all go through the same
//! count/sum accumulator.

use serde::{Deserialize, Serialize};

/// Running count and sum of a measured quantity
///
/// # Example
/// ```
/// use location_simulator_core_rs::Accumulator;
///
/// let mut latency = Accumulator::new();
/// assert_eq!(latency.average(), None);
///
/// latency.add(40.0);
/// latency.add(60.0);
/// assert_eq!(latency.count(), 2);
/// assert_eq!(latency.average(), Some(50.0));
/// assert_eq!(latency.rate_per_second(), Some(20.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    count: u64,
    total: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
    }

    /// Count a boolean outcome as 1.0 (true) or 0.0 (false)
    pub fn add_bool(&mut self, value: bool) {
        self.add(if value { 1.0 } else { 0.0 });
    }

    /// Fold another accumulator into this one
    pub fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.total += other.total;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Mean of the recorded values, `None` before the first sample
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as f64)
        }
    }

    /// Throughput-equivalent rate for a duration in milliseconds
    ///
    /// `1000 / average`, i.e. events per second. `None` when there are no
    /// samples or the average is zero.
    pub fn rate_per_second(&self) -> Option<f64> {
        self.average()
            .filter(|average| *average > 0.0)
            .map(|average| 1000.0 / average)
    }
}
