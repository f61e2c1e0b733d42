//! Location Simulator Core - Rust Engine
//!
//! Discrete-event simulator of a forwarding-pointer location protocol: a
//! mobile agent leaves forwarders behind as it migrates, a source follows
//! them to reach it, and a location server is the fallback when the chain
//! breaks.
//!
//! # Architecture
//!
//! - **core**: Virtual time, the event calendar and the entity contract
//! - **models**: Protocol entities (Agent, Forwarder, Chain, Source, Server)
//! - **orchestrator**: Configuration, batch-stepping driver and report
//! - **stats**: Running accumulators and path analysis
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Each entity has at most one pending event in the calendar
//! 2. The virtual clock never moves backwards
//! 3. All randomness is deterministic (seeded RNG)
//! 4. FFI boundary is minimal and safe

// Module declarations
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod rng;
pub mod stats;

// Re-exports for convenience
pub use crate::core::calendar::{Calendar, EntityRef, Event, EventKey};
pub use crate::core::entity::{Scheduler, SimulationEntity, Timer};
pub use crate::core::time::{SimClock, SimTime};
pub use models::{
    agent::{Agent, AgentState},
    chain::{Chain, ChainState},
    event::{EventLog, SimEvent},
    forwarder::{Forwarder, ForwarderState},
    request::{Request, RequestOrigin, RequestQueue},
    server::{Server, ServerState},
    source::{Source, SourceState},
    state::SimulationState,
};
pub use orchestrator::{
    ConfigError, ForwarderLifetime, OnSitePolicy, Orchestrator, Rates, ServerMode,
    SimulationConfig, SimulationError, SimulationReport, StepResult,
};
pub use rng::RngManager;
pub use stats::Accumulator;

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn location_simulator_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::PySimulation>()?;
    Ok(())
}
