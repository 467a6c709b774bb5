//! Agent configuration, run events and the streaming runner

mod config;
mod events;
mod pending;
mod runner;

pub use config::{AgentConfig, AgentOverride, INPUT_PLACEHOLDER};
pub use events::{EventBus, EventSink, FlowEvent, FnSink, RunStats, RunStatsSnapshot};
pub use pending::{PendingDecisions, PendingOutcome, PendingStore};
pub use runner::{InvocationScope, RunOutcome, StreamingRunner};
