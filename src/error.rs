//! Error types for subloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in the cycle loop and its primitives
#[derive(Debug, Error)]
pub enum LoopError {
    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Push attempted on a closed message channel
    #[error("Cannot push to a closed message channel")]
    ChannelClosed,

    /// Backend session error
    #[error("Session error: {0}")]
    Session(String),

    /// Decision-role collaborator failed
    #[error("Role error ({role}): {message}")]
    Role { role: String, message: String },

    /// Scheduled task failed inside the coordinator
    #[error("Scheduler error ({task}): {message}")]
    Scheduler { task: String, message: String },

    /// Deferred follow-up work failed or panicked
    #[error("Deferred work failed: {0}")]
    Deferred(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// External process error
    #[error("Process error: {0}")]
    Process(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoopError {
    /// Build a role error for the named collaborator
    pub fn role(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            message: message.into(),
        }
    }

    /// Build a scheduler error for the named task
    pub fn scheduler(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scheduler {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for subloop operations
pub type Result<T> = std::result::Result<T, LoopError>;
