//! Virtual time for the simulation
//!
//! The simulation operates in continuous virtual milliseconds. The clock
//! only moves forward, and only when the driver pops the next batch of
//! events from the calendar.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

/// A point on the virtual time axis, in milliseconds
///
/// Wraps an `f64` with a total order so it can key ordered collections.
///
/// # Example
/// ```
/// use location_simulator_core_rs::SimTime;
///
/// let t = SimTime::ZERO + 250.0;
/// assert_eq!(t.as_millis(), 250.0);
/// assert!(SimTime::ZERO < t);
/// ```
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn from_millis(millis: f64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> f64 {
        self.0
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Bit equality is exactly `total_cmp` equality.
impl Hash for SimTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, millis: f64) -> SimTime {
        SimTime(self.0 + millis)
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.0)
    }
}

/// Manages the virtual clock and the configured run length
///
/// # Example
/// ```
/// use location_simulator_core_rs::{SimClock, SimTime};
///
/// let mut clock = SimClock::new(1_000.0);
/// assert_eq!(clock.now(), SimTime::ZERO);
///
/// clock.advance_to(SimTime::from_millis(400.0));
/// assert_eq!(clock.now().as_millis(), 400.0);
/// assert!(!clock.is_past_end(SimTime::from_millis(1_000.0)));
/// assert!(clock.is_past_end(SimTime::from_millis(1_000.5)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current virtual time
    now: SimTime,
    /// Virtual time at which the run stops
    end: SimTime,
}

impl SimClock {
    /// Create a clock at time zero that runs for `run_length` milliseconds
    pub fn new(run_length: f64) -> Self {
        assert!(run_length > 0.0, "run_length must be positive");
        Self {
            now: SimTime::ZERO,
            end: SimTime::from_millis(run_length),
        }
    }

    /// Move the clock to `time`
    ///
    /// # Panics
    /// Panics if `time` lies before the current time; the calendar never
    /// hands out such a batch.
    pub fn advance_to(&mut self, time: SimTime) {
        assert!(time >= self.now, "virtual clock cannot move backwards");
        self.now = time;
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn end(&self) -> SimTime {
        self.end
    }

    /// Milliseconds elapsed since time zero
    pub fn elapsed(&self) -> f64 {
        self.now - SimTime::ZERO
    }

    /// True when an event at `time` falls after the configured run length
    pub fn is_past_end(&self, time: SimTime) -> bool {
        time > self.end
    }
}
