//! Composite commands
//!
//! A composite command is a fixed list of steps. Steps run strictly one after
//! another; a failed `Stop` step ends the sequence, a failed `Ignore` step is
//! remembered and the sequence goes on. Either way the composite fails if
//! any step did.

use crate::command::Command;
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// What a failed step does to the rest of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFail {
    Stop,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub command: Command,
    /// Target pattern; empty for project-level commands
    pub targets: &'static str,
    pub on_fail: OnFail,
}

const fn step(command: Command, targets: &'static str, on_fail: OnFail) -> Step {
    Step {
        command,
        targets,
        on_fail,
    }
}

const DEPLOYMENT_CREATE: &[Step] = &[
    step(Command::CreateFloatingIps, "", OnFail::Stop),
    step(Command::CreateNetworking, "", OnFail::Stop),
    step(Command::CreateSecurityGroups, "", OnFail::Stop),
    step(Command::CreateVolumes, "*", OnFail::Stop),
    step(Command::CreateInstances, "*", OnFail::Stop),
    step(Command::PingInstances, "*", OnFail::Stop),
    step(Command::AttachVolumes, "bastion", OnFail::Stop),
    step(Command::InstallServices, "bastion", OnFail::Stop),
    step(
        Command::InstallServices,
        "rabbitmq,prometheus,daemon*,cass*",
        OnFail::Stop,
    ),
    step(Command::StopServices, "cass*", OnFail::Stop),
    step(Command::ConfigServices, "cass*", OnFail::Stop),
    step(
        Command::ConfigServices,
        "bastion,rabbitmq,prometheus,daemon*",
        OnFail::Stop,
    ),
    step(Command::CheckCassandraStatus, "", OnFail::Stop),
];

const DEPLOYMENT_CREATE_IMAGES: &[Step] = &[
    step(Command::StopServices, "*", OnFail::Ignore),
    step(Command::DetachVolumes, "bastion", OnFail::Stop),
    step(Command::CreateSnapshotImages, "*", OnFail::Stop),
    step(Command::DeleteInstances, "*", OnFail::Stop),
];

const DEPLOYMENT_RESTORE_INSTANCES: &[Step] = &[
    step(Command::CreateInstancesFromSnapshotImages, "*", OnFail::Stop),
    step(Command::PingInstances, "*", OnFail::Stop),
    step(Command::AttachVolumes, "bastion", OnFail::Stop),
    step(Command::StartServices, "*", OnFail::Stop),
    step(Command::StopServices, "cass*", OnFail::Stop),
    step(Command::ConfigServices, "cass*", OnFail::Stop),
];

const DEPLOYMENT_DELETE_IMAGES: &[Step] = &[step(Command::DeleteSnapshotImages, "*", OnFail::Stop)];

const DEPLOYMENT_DELETE: &[Step] = &[
    step(Command::DeleteSnapshotImages, "*", OnFail::Stop),
    step(Command::StopServices, "*", OnFail::Ignore),
    step(Command::DetachVolumes, "bastion", OnFail::Stop),
    step(Command::DeleteInstances, "*", OnFail::Ignore),
    step(Command::DeleteVolumes, "*", OnFail::Ignore),
    step(Command::DeleteSecurityGroups, "", OnFail::Ignore),
    step(Command::DeleteNetworking, "", OnFail::Ignore),
    step(Command::DeleteFloatingIps, "", OnFail::Ignore),
];

/// Steps of a composite command; `None` for primitives
pub fn expand(command: Command) -> Option<&'static [Step]> {
    match command {
        Command::DeploymentCreate => Some(DEPLOYMENT_CREATE),
        Command::DeploymentCreateImages => Some(DEPLOYMENT_CREATE_IMAGES),
        Command::DeploymentRestoreInstances => Some(DEPLOYMENT_RESTORE_INSTANCES),
        Command::DeploymentDeleteImages => Some(DEPLOYMENT_DELETE_IMAGES),
        Command::DeploymentDelete => Some(DEPLOYMENT_DELETE),
        _ => None,
    }
}

/// Runs one primitive step to completion
#[async_trait]
pub trait StepRunner: Send {
    async fn run_step(&mut self, command: Command, targets: &str) -> Result<()>;
}

/// Run `steps` in order, honouring each step's failure policy
pub async fn run_sequence<R>(runner: &mut R, steps: &[Step]) -> Result<()>
where
    R: StepRunner + ?Sized,
{
    let mut failed = Vec::new();

    for step in steps {
        info!("step {} '{}'", step.command, step.targets);
        if let Err(e) = runner.run_step(step.command, step.targets).await {
            let summary = if step.targets.is_empty() {
                format!("{}: {}", step.command, e)
            } else {
                format!("{} {}: {}", step.command, step.targets, e)
            };
            failed.push(summary);
            match step.on_fail {
                OnFail::Stop => {
                    warn!("step {} failed, stopping", step.command);
                    return Err(DeployError::StepsFailed(failed));
                }
                OnFail::Ignore => warn!("step {} failed, continuing", step.command),
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(DeployError::StepsFailed(failed))
    }
}
