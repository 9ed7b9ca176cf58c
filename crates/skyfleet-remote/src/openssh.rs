//! OpenSSH transport
//!
//! Each session is an `ssh` ControlMaster running in the background with its
//! control socket in a private temporary directory. Commands are multiplexed
//! over the socket; the hop to a private host goes through the bastion's
//! master with `ssh -W`.

use crate::error::{RemoteError, Result};
use crate::transport::{RawOutput, Transport};
use async_trait::async_trait;
use skyfleet_core::SshConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::{NamedTempFile, TempDir};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const CONNECT_TIMEOUT_SECS: u32 = 10;

/// An open ControlMaster
#[derive(Debug)]
pub struct SshSession {
    program: String,
    destination: String,
    port: u16,
    socket: PathBuf,
    closed: bool,
}

impl SshSession {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn exit_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.socket.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.destination.clone(),
        ]
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Session future was dropped before disconnect ran
        let status = std::process::Command::new(&self.program)
            .args(self.exit_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            warn!("failed to stop ssh master for {}: {}", self.destination, e);
        }
    }
}

/// [`Transport`] backed by the system `ssh` binary
pub struct OpenSshTransport {
    program: String,
    user: String,
    port: u16,
    key_path: PathBuf,
    control_dir: TempDir,
    // Keeps an inline key on disk for as long as the transport lives
    _inline_key: Option<NamedTempFile>,
    counter: AtomicU32,
}

impl OpenSshTransport {
    pub fn new(config: &SshConfig) -> Result<Self> {
        if config.user.is_empty() {
            return Err(RemoteError::InvalidConfig("ssh user is empty".to_string()));
        }

        let control_dir = tempfile::Builder::new().prefix("skyfleet-ssh").tempdir()?;

        let (key_path, inline_key) = match (&config.private_key, &config.private_key_path) {
            (Some(key), _) if !key.trim().is_empty() => {
                // NamedTempFile is created with mode 0600
                let mut file = NamedTempFile::new_in(control_dir.path())?;
                file.write_all(key.as_bytes())?;
                if !key.ends_with('\n') {
                    file.write_all(b"\n")?;
                }
                file.flush()?;
                (file.path().to_path_buf(), Some(file))
            }
            (_, Some(path)) if !path.is_empty() => (expand_home(path)?, None),
            _ => {
                return Err(RemoteError::InvalidConfig(
                    "either private_key_path or private_key is required".to_string(),
                ));
            }
        };

        Ok(Self {
            program: "ssh".to_string(),
            user: config.user.clone(),
            port: config.port,
            key_path,
            control_dir,
            _inline_key: inline_key,
            counter: AtomicU32::new(0),
        })
    }

    /// Use another ssh binary (path or name on `PATH`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn next_socket(&self) -> (PathBuf, PathBuf) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let dir = self.control_dir.path();
        (dir.join(format!("m{}.sock", n)), dir.join(format!("m{}.log", n)))
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = Vec::new();
        for option in [
            "BatchMode=yes".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
            "LogLevel=ERROR".to_string(),
        ] {
            args.push("-o".to_string());
            args.push(option);
        }
        args
    }

    /// Arguments that start a backgrounded master for `host`
    fn master_args(
        &self,
        host: &str,
        socket: &Path,
        log: &Path,
        via: Option<&SshSession>,
    ) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "-N".to_string(),
            "-M".to_string(),
            "-S".to_string(),
            socket.display().to_string(),
            "-E".to_string(),
            log.display().to_string(),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
        ];
        args.extend(self.common_options());
        if let Some(via) = via {
            args.push("-o".to_string());
            args.push(format!(
                "ProxyCommand={} -S {} -W %h:%p {}",
                self.program,
                via.socket.display(),
                via.destination
            ));
        }
        args.extend([
            "-i".to_string(),
            self.key_path.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            format!("{}@{}", self.user, host),
        ]);
        args
    }

    async fn open(&self, host: &str, via: Option<&SshSession>) -> Result<SshSession> {
        let (socket, log) = self.next_socket();
        let args = self.master_args(host, &socket, &log, via);

        debug!("Running: {} {}", self.program, args.join(" "));

        // -f backgrounds the master after authentication; its stdio must not
        // be piped or waiting on the foreground process would never finish
        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            let message = tokio::fs::read_to_string(&log).await.unwrap_or_default();
            return Err(RemoteError::Connect {
                host: host.to_string(),
                message: if message.trim().is_empty() {
                    format!("ssh exited with {}", status)
                } else {
                    message.trim().to_string()
                },
            });
        }

        Ok(SshSession {
            program: self.program.clone(),
            destination: format!("{}@{}", self.user, host),
            port: self.port,
            socket,
            closed: false,
        })
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| {
                RemoteError::InvalidConfig(format!("cannot expand {}: no home directory", path))
            }),
        None => Ok(PathBuf::from(path)),
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    type Session = SshSession;

    async fn connect(&self, host: &str) -> Result<SshSession> {
        self.open(host, None).await
    }

    async fn connect_via(&self, via: &SshSession, host: &str) -> Result<SshSession> {
        self.open(host, Some(via)).await
    }

    async fn exec(&self, session: &SshSession, script: &str) -> Result<RawOutput> {
        let mut child = Command::new(&self.program)
            .arg("-S")
            .arg(&session.socket)
            .arg("-p")
            .arg(session.port.to_string())
            .arg(&session.destination)
            .arg("bash -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed the script while draining stdout and stderr, a remote that
        // echoes its input would otherwise fill the pipes and stall both ends
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(script.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        match fed {
            // The remote may exit without reading all of its input
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} closed stdin early", session.destination);
            }
            fed => fed?,
        }
        Ok(RawOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }

    async fn disconnect(&self, mut session: SshSession) -> Result<()> {
        session.closed = true;
        let output = Command::new(&self.program)
            .args(session.exit_args())
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(RemoteError::Session(format!(
                "ssh -O exit for {}: {}",
                session.destination,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
