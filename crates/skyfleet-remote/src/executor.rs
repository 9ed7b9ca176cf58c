//! Bastion-hop command execution

use crate::error::{RemoteError, Result};
use crate::transport::{RawOutput, Transport};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one remote command, kept for the log even when it failed
#[derive(Debug)]
pub struct ExecResult {
    pub host: String,
    pub cmd: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub error: Option<RemoteError>,
}

impl ExecResult {
    pub fn new(host: &str, cmd: &str) -> Self {
        Self {
            host: host.to_string(),
            cmd: cmd.to_string(),
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Last stdout line, trimmed
    pub fn last_line(&self) -> &str {
        self.stdout
            .trim_end()
            .lines()
            .last()
            .map(str::trim)
            .unwrap_or_default()
    }

    /// Take captured output; a non-zero exit or any stderr becomes the error
    pub fn absorb(&mut self, output: RawOutput) {
        self.stdout = output.stdout;
        self.stderr = output.stderr;
        self.error = match output.exit_code {
            Some(0) if self.stderr.trim().is_empty() => None,
            Some(0) => Some(RemoteError::Stderr(self.stderr.trim().to_string())),
            Some(code) => Some(RemoteError::CommandFailed {
                code,
                stderr: self.stderr.trim().to_string(),
            }),
            None => Some(RemoteError::Session(format!(
                "command on {} was killed by a signal",
                self.host
            ))),
        };
    }
}

impl fmt::Display for ExecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cmd: {}", self.cmd)?;
        writeln!(f, "stdout: {}", self.stdout.trim_end())?;
        writeln!(f, "stderr: {}", self.stderr.trim_end())?;
        match &self.error {
            Some(e) => writeln!(f, "error: {}", e)?,
            None => writeln!(f, "error: none")?,
        }
        write!(f, "remote elapsed: {:.3}s", self.elapsed.as_secs_f64())
    }
}

/// Prefix a script with its environment
///
/// One `KEY=value` line per variable in key order; values containing a
/// space are single-quoted.
pub fn build_script(env: &BTreeMap<String, String>, script: &str) -> String {
    let mut out = String::new();
    for (key, value) in env {
        if value.contains(' ') {
            out.push_str(&format!("{}='{}'\n", key, value));
        } else {
            out.push_str(&format!("{}={}\n", key, value));
        }
    }
    out.push_str(script);
    out
}

/// Object-safe view of a command runner
///
/// The deploy layer only needs this; tests can implement it directly.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `cmd` on `host`, capturing output, elapsed time and error
    async fn exec(&self, host: &str, cmd: &str) -> ExecResult;

    /// Run `script` on `host` with `env` prepended
    async fn exec_script(
        &self,
        host: &str,
        env: &BTreeMap<String, String>,
        script: &str,
    ) -> ExecResult {
        self.exec(host, &build_script(env, script)).await
    }

    /// Run `cmd` and return its last stdout line
    async fn exec_and_last_line(&self, host: &str, cmd: &str) -> Result<String> {
        let mut result = self.exec(host, cmd).await;
        match result.error.take() {
            Some(e) => Err(e),
            None => Ok(result.last_line().to_string()),
        }
    }

    /// Check that `host` answers `id`, trying up to `attempts` times
    ///
    /// Sleeps `pause` between failed attempts. Returns the last attempt.
    async fn ping(&self, host: &str, attempts: u32, pause: Duration) -> ExecResult {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self.exec(host, "id").await;
            if result.is_ok() || attempt >= attempts {
                return result;
            }
            debug!("ping {} attempt {}/{} failed, retrying", host, attempt, attempts);
            attempt += 1;
            tokio::time::sleep(pause).await;
        }
    }
}

#[async_trait]
impl<T> RemoteShell for RemoteExecutor<T>
where
    T: Transport,
{
    /// The bastion itself is reached directly. Any other host gets an outer
    /// session to the bastion and an inner session tunnelled through it; both
    /// are closed before this returns, whatever happened in between.
    async fn exec(&self, host: &str, cmd: &str) -> ExecResult {
        self.exec_timed(host, cmd).await
    }
}

/// Runs commands on deployment hosts, hopping through the bastion
pub struct RemoteExecutor<T: Transport> {
    transport: T,
    bastion_address: String,
}

impl<T: Transport> RemoteExecutor<T> {
    pub fn new(transport: T, bastion_address: impl Into<String>) -> Self {
        Self {
            transport,
            bastion_address: bastion_address.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn bastion_address(&self) -> &str {
        &self.bastion_address
    }

    async fn exec_timed(&self, host: &str, cmd: &str) -> ExecResult {
        let started = Instant::now();
        let mut result = ExecResult::new(host, cmd);

        match self.run(host, cmd).await {
            Ok(output) => result.absorb(output),
            Err(e) => result.error = Some(e),
        }
        result.elapsed = started.elapsed();

        debug!(
            "exec on {} finished in {:.3}s ({})",
            host,
            result.elapsed.as_secs_f64(),
            if result.is_ok() { "ok" } else { "failed" }
        );
        result
    }

    async fn run(&self, host: &str, cmd: &str) -> Result<RawOutput> {
        if self.bastion_address.is_empty() {
            return Err(RemoteError::InvalidConfig(
                "bastion address is not known yet".to_string(),
            ));
        }

        if host == self.bastion_address {
            return self.exec_in(host, None, cmd).await;
        }

        let outer = self.hold(&self.bastion_address, None).await?;
        let output = self.exec_in(host, Some(&outer), cmd).await;
        outer.release().await;
        output
    }

    /// Open a session to `host`, run `cmd` in it and close it again
    async fn exec_in(
        &self,
        host: &str,
        via: Option<&HeldSession<'_, T>>,
        cmd: &str,
    ) -> Result<RawOutput> {
        let session = self.hold(host, via).await?;
        let output = self.transport.exec(&session.session, cmd).await;
        session.release().await;
        output
    }

    async fn hold(&self, host: &str, via: Option<&HeldSession<'_, T>>) -> Result<HeldSession<'_, T>> {
        let session = match via {
            Some(via) => self.transport.connect_via(&via.session, host).await?,
            None => self.transport.connect(host).await?,
        };
        Ok(HeldSession {
            transport: &self.transport,
            host: host.to_string(),
            session,
        })
    }
}

/// An open session and the transport it goes back to
///
/// `release` is the only way sessions are closed here. If the owning future
/// is cancelled first, the session's own `Drop` is left to clean up.
struct HeldSession<'a, T: Transport> {
    transport: &'a T,
    host: String,
    session: T::Session,
}

impl<T: Transport> HeldSession<'_, T> {
    async fn release(self) {
        if let Err(e) = self.transport.disconnect(self.session).await {
            warn!("failed to close session to {}: {}", self.host, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_script_sorts_and_quotes() {
        let env = BTreeMap::from([
            ("ZK_HOSTS".to_string(), "10.0.0.1 10.0.0.2".to_string()),
            ("CLUSTER".to_string(), "prod".to_string()),
        ]);

        let script = build_script(&env, "echo $CLUSTER\n");
        assert_eq!(
            script,
            "CLUSTER=prod\nZK_HOSTS='10.0.0.1 10.0.0.2'\necho $CLUSTER\n"
        );
    }

    #[test]
    fn test_build_script_without_env() {
        assert_eq!(build_script(&BTreeMap::new(), "id"), "id");
    }

    #[test]
    fn test_last_line() {
        let mut result = ExecResult::new("h", "c");
        result.stdout = "mke2fs 1.45\n\n  8d3c-44e1  \n\n".to_string();
        assert_eq!(result.last_line(), "8d3c-44e1");

        result.stdout.clear();
        assert_eq!(result.last_line(), "");
    }

    #[test]
    fn test_stderr_is_soft_failure() {
        let mut result = ExecResult::new("h", "c");
        result.absorb(RawOutput {
            stdout: "done".into(),
            stderr: "warning: deprecated\n".into(),
            exit_code: Some(0),
        });
        assert!(matches!(result.error, Some(RemoteError::Stderr(ref s)) if s == "warning: deprecated"));

        let mut result = ExecResult::new("h", "c");
        result.absorb(RawOutput {
            stdout: String::new(),
            stderr: "boom".into(),
            exit_code: Some(2),
        });
        assert!(matches!(result.error, Some(RemoteError::CommandFailed { code: 2, .. })));
    }
}
