//! Orchestrator - main simulation loop
//!
//! Configuration, the batch-stepping driver, and the final report.
//!
//! See `engine.rs` for the driver itself.

pub mod config;
pub mod engine;
pub mod report;

// Re-export main types for convenience
pub use config::{
    AdaptiveTtl, ConfigError, ForwarderLifetime, OnSitePolicy, Rates, ServerMode,
    SimulationConfig,
};
pub use engine::{Orchestrator, SimulationError, StepResult};
pub use report::{compute_config_hash, CoupleReport, ServerReport, SimulationReport};
