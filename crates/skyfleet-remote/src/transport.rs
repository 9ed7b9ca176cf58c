//! Session transport trait definition

use crate::error::Result;
use async_trait::async_trait;

/// Captured output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the command was killed by a signal
    pub exit_code: Option<i32>,
}

/// A way of opening shell sessions to hosts
///
/// Every session returned by `connect` or `connect_via` must be handed back
/// to `disconnect`. Implementations should still release sessions that are
/// dropped without it.
#[async_trait]
pub trait Transport: Send + Sync {
    type Session: Send + Sync;

    /// Open a session directly to `host`
    async fn connect(&self, host: &str) -> Result<Self::Session>;

    /// Open a session to `host`, tunnelled through an open session
    async fn connect_via(&self, via: &Self::Session, host: &str) -> Result<Self::Session>;

    /// Run one shell script in a session
    async fn exec(&self, session: &Self::Session, script: &str) -> Result<RawOutput>;

    async fn disconnect(&self, session: Self::Session) -> Result<()>;
}
