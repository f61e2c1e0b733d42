//! Domain models of the location protocol

pub mod agent;
pub mod chain;
pub mod event;
pub mod forwarder;
pub mod request;
pub mod server;
pub mod source;
pub mod state;

// Re-exports
pub use agent::{Agent, AgentOutcome, AgentState, AgentStats};
pub use chain::{AgentPosition, Chain, ChainState, HopOutcome, Traversal};
pub use event::{EventLog, SimEvent};
pub use forwarder::{Forwarder, ForwarderState};
pub use request::{PushOutcome, Request, RequestOrigin, RequestQueue};
pub use server::{DirectoryEntry, Server, ServerState, ServerStats};
pub use source::{Source, SourceOutcome, SourceState, SourceStats};
pub use state::SimulationState;
