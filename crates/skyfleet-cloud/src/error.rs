//! Cloud client error types

use thiserror::Error;

/// Cloud client errors
///
/// `NotFound` is the only variant callers routinely recover from: an absent
/// resource triggers the create path. Everything else fails the step.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Exists, but in an unexpected state or with a mismatched identity
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The control plane rejected a mutation because it is already in effect
    /// (duplicate rule, existing route, ...)
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Control-plane error, surfaced as-is and never retried blindly
    #[error("API error: {0}")]
    Api(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudError::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
