//! Remote execution errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("SSH connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    #[error("Remote command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The command exited cleanly but complained on stderr
    #[error("Remote command wrote to stderr: {0}")]
    Stderr(String),

    #[error("Remote session terminated: {0}")]
    Session(String),

    #[error("Invalid SSH configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RemoteError>;
