use thiserror::Error;
use tierflow_ai::AiError;

/// Errors raised while loading, validating or running a workflow
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow declares no agents")]
    MissingAgents,

    #[error("Workflow declares no steps")]
    MissingSteps,

    #[error("Step {step} references unknown agent '{agent}'")]
    UnknownAgent { step: usize, agent: String },

    #[error("Step {step} sets both 'input' and 'input_from'")]
    ConflictingInput { step: usize },

    #[error("Agent '{agent}' has an invalid model reference: {reason}")]
    InvalidModel { agent: String, reason: String },

    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    #[error("Failed to read workflow: {0}")]
    Io(#[from] std::io::Error),

    #[error("Step {step} ({agent}) failed: {source}")]
    StepFailed {
        step: usize,
        agent: String,
        #[source]
        source: AiError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
