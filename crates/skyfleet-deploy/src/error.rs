//! Deployment error types

use skyfleet_cloud::CloudError;
use skyfleet_core::ProjectError;
use skyfleet_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A resource another command is supposed to create is not there
    #[error("{what} not found, did you run {hint}?")]
    Missing { what: String, hint: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("cannot read script {}: {message}", path.display())]
    Script { path: PathBuf, message: String },

    #[error("cannot mount volume {volume} on {instance}: {message}")]
    VolumeInit {
        volume: String,
        instance: String,
        message: String,
    },

    #[error("{0}")]
    Cassandra(String),

    /// A task ended without reporting (panicked or was aborted)
    #[error("task for {target} did not report: {message}")]
    Task { target: String, message: String },

    #[error("{} step(s) failed: {}", .0.len(), .0.join("; "))]
    StepsFailed(Vec<String>),
}

impl DeployError {
    /// Turn a cloud `NotFound` into [`DeployError::Missing`]
    pub fn missing(what: impl Into<String>, hint: &'static str) -> impl FnOnce(CloudError) -> Self {
        let what = what.into();
        move |e| {
            if e.is_not_found() {
                DeployError::Missing { what, hint }
            } else {
                DeployError::Cloud(e)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
