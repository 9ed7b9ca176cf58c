//! Shared state handed to every task

use crate::error::{DeployError, Result};
use skyfleet_cloud::Reconciler;
use skyfleet_core::{InstanceDef, Project, SshConfig};
use skyfleet_remote::{OpenSshTransport, RemoteError, RemoteExecutor, RemoteShell};
use std::sync::Arc;
use std::time::Duration;

/// Run-wide switches, mostly from the command line
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub verbose: bool,
    /// Attempts made by `ping_instances`
    pub ping_repetitions: u32,
    /// Let `delete_instances` proceed while volumes are still attached
    pub ignore_attached_volumes: bool,
    /// Sleep between failed ping attempts
    pub ping_pause: Duration,
    /// One task is admitted per period
    pub throttle_period: Duration,
    pub max_workers: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            ping_repetitions: 1,
            ignore_attached_volumes: false,
            ping_pause: Duration::from_secs(5),
            throttle_period: Duration::from_secs(1),
            max_workers: crate::executor::MAX_WORKER_THREADS,
        }
    }
}

/// Opens the remote shell once the bastion address is known
pub trait ShellFactory: Send + Sync {
    fn open(&self, ssh: &SshConfig) -> std::result::Result<Arc<dyn RemoteShell>, RemoteError>;
}

/// Production factory: system `ssh` through the bastion
#[derive(Debug, Default)]
pub struct OpenSshShellFactory;

impl ShellFactory for OpenSshShellFactory {
    fn open(&self, ssh: &SshConfig) -> std::result::Result<Arc<dyn RemoteShell>, RemoteError> {
        let transport = OpenSshTransport::new(ssh)?;
        Ok(Arc::new(RemoteExecutor::new(
            transport,
            ssh.external_ip_address.clone(),
        )))
    }
}

/// Read-only view of the run, shared by all tasks of a step
pub struct TaskContext {
    pub project: Project,
    pub reconciler: Reconciler,
    pub options: DeployOptions,
    shell: Option<Arc<dyn RemoteShell>>,
}

impl TaskContext {
    pub fn new(
        project: Project,
        reconciler: Reconciler,
        shell: Option<Arc<dyn RemoteShell>>,
        options: DeployOptions,
    ) -> Self {
        Self {
            project,
            reconciler,
            options,
            shell,
        }
    }

    pub fn shell(&self) -> Result<&dyn RemoteShell> {
        self.shell.as_deref().ok_or_else(|| {
            DeployError::Invalid("bastion address is unknown, cannot reach hosts".to_string())
        })
    }

    pub fn instance(&self, nickname: &str) -> Result<&InstanceDef> {
        self.project
            .instances
            .get(nickname)
            .ok_or_else(|| DeployError::Invalid(format!("instance {} is not declared", nickname)))
    }

    /// Address the remote shell should use for `def`
    pub fn host_of<'a>(&self, def: &'a InstanceDef) -> Result<&'a str> {
        def.best_ip_address().ok_or_else(|| {
            DeployError::Invalid(format!(
                "external address of {} is unknown, did you run create_floating_ips?",
                def.inst_name
            ))
        })
    }
}

/// Timeout values in the project are seconds
pub fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}
