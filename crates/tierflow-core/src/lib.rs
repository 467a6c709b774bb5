//! Tierflow Core - workflow documents, prompt assembly and project wiring.

pub mod config;
pub mod error;
pub mod paths;
pub mod project;
pub mod template;
pub mod workflow;

pub use config::{LongTierConfig, LongTierKind, MemoryConfig, TierflowConfig};
pub use error::{Result, WorkflowError};
pub use project::Project;
pub use workflow::{
    ExecutionConfig, ExecutionMode, StepReport, WorkflowDefinition, WorkflowEngine,
    WorkflowReport, WorkflowStep,
};
