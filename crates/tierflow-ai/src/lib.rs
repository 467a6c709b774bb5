//! Tierflow AI - streaming model adapters and tiered agent memory
//!
//! This crate provides:
//! - Backend-qualified model references and a registry of streaming backends
//!   (Ollama, OpenAI, OpenWebUI, generic HTTP, mock)
//! - Incremental frame decoders for JSON lines, raw text and event streams
//! - A heuristic classifier deciding whether an output is worth keeping
//! - Three memory tiers (ephemeral, mid, long) behind one manager
//! - The streaming runner, its event bus and pending store decisions

pub mod agent;
pub mod error;
mod http_client;
pub mod llm;
pub mod memory;

pub use agent::{
    AgentConfig, AgentOverride, EventBus, EventSink, FlowEvent, FnSink, InvocationScope,
    PendingOutcome, PendingStore, RunOutcome, RunStatsSnapshot, StreamingRunner,
};
pub use error::{AiError, Result};
pub use llm::{
    Backend, BackendRegistry, BackendSettings, FragmentStream, ModelRef, StreamBackend,
    StreamEvent, collect_text,
};
pub use memory::{
    EphemeralStore, ForceOptions, HttpVectorIndex, InMemoryIndex, LongTermHit, LongTermIndex,
    MemoryManager, MemoryRecord, StoragePolicy, StoreDecision, StoreMeta, StoreOutcome,
};
