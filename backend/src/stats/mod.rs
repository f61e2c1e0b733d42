//! Statistics collection
//!
//! Running accumulators for every measured quantity, and the optional path
//! analysis over per-couple state trajectories.

mod accumulator;
pub mod path;

pub use accumulator::Accumulator;
pub use path::{PathState, PathSummary, PathTracker, SourcePhase};
