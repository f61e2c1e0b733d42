//! Deterministic random number generation
//!
//! Uses xorshift64* algorithm for fast, deterministic random number generation.
//! CRITICAL: All randomness in the simulator MUST go through this module.

mod generators;
mod xorshift;

pub use generators::{DurationGenerators, ExponentialGenerator, RateParameter};
pub use xorshift::RngManager;
