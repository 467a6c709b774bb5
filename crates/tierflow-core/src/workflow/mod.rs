//! Workflow documents and the engine that runs them

mod definition;
mod engine;

pub use definition::{ExecutionConfig, ExecutionMode, WorkflowDefinition, WorkflowStep};
pub use engine::{StepReport, WorkflowEngine, WorkflowReport};
