//! Error types for the AI module

use thiserror::Error;

/// AI module error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Transport error from {backend}: {message}")]
    Transport { backend: String, message: String },

    #[error("{backend} returned HTTP {status}: {message}")]
    Http {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend} call timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    #[error("Missing credential for {backend}: set {env_var}")]
    MissingCredential {
        backend: String,
        env_var: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid model reference '{reference}': {reason}")]
    InvalidModel { reference: String, reason: String },

    #[error("No pending store decision with id {0}")]
    UnknownPending(uuid::Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    /// Map a reqwest failure for `backend` onto the transport taxonomy.
    pub fn from_reqwest(backend: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                backend: backend.to_string(),
                secs: timeout_secs,
            };
        }
        Self::Transport {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }

    /// True for failures that happen before any stream is opened.
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::Config(_) | Self::InvalidModel { .. }
        )
    }
}

/// Result type alias for AI operations
pub type Result<T> = std::result::Result<T, AiError>;
