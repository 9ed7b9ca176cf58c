//! Primitive commands
//!
//! Every operation takes the shared [`TaskContext`] and a [`LogBuilder`] for
//! its own task, and returns a plain result. [`run`] turns that into the
//! `(log message, result)` pair the executor collects.

pub mod cassandra;
pub mod floating_ips;
pub mod images;
pub mod instances;
pub mod listing;
pub mod networking;
pub mod security_groups;
pub mod services;
pub mod volumes;

use crate::command::Command;
use crate::context::TaskContext;
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_core::ServicePhase;
use std::fmt;
use std::sync::Arc;

/// What a single task works on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Deployment,
    Instance(String),
    Volume { instance: String, volume: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Deployment => Ok(()),
            Target::Instance(nickname) => write!(f, "{}", nickname),
            Target::Volume { instance, volume } => write!(f, "{}/{}", instance, volume),
        }
    }
}

/// Run `command` on one target and render its log
pub async fn run(ctx: Arc<TaskContext>, command: Command, target: Target) -> (String, Result<()>) {
    let header = match target {
        Target::Deployment => command.to_string(),
        _ => format!("{} {}", command, target),
    };
    let mut log = LogBuilder::new(header, ctx.options.verbose);
    let result = dispatch(&ctx, command, &target, &mut log).await;
    log.complete(result)
}

async fn dispatch(
    ctx: &TaskContext,
    command: Command,
    target: &Target,
    log: &mut LogBuilder,
) -> Result<()> {
    match (command, target) {
        (Command::ListDeployments, Target::Deployment) => listing::list_deployments(ctx, log).await,
        (Command::ListDeploymentResources, Target::Deployment) => {
            listing::list_deployment_resources(ctx, log).await
        }
        (Command::CreateFloatingIps, Target::Deployment) => floating_ips::create(ctx, log).await,
        (Command::DeleteFloatingIps, Target::Deployment) => floating_ips::delete(ctx, log).await,
        (Command::CreateNetworking, Target::Deployment) => networking::create(ctx, log).await,
        (Command::DeleteNetworking, Target::Deployment) => networking::delete(ctx, log).await,
        (Command::CreateSecurityGroups, Target::Deployment) => {
            security_groups::create(ctx, log).await
        }
        (Command::DeleteSecurityGroups, Target::Deployment) => {
            security_groups::delete(ctx, log).await
        }
        (Command::CheckCassandraStatus, Target::Deployment) => {
            cassandra::check_status(ctx, log).await
        }

        (Command::CreateInstances, Target::Instance(nickname)) => {
            instances::create(ctx, log, nickname).await
        }
        (Command::CreateInstancesFromSnapshotImages, Target::Instance(nickname)) => {
            instances::create_from_snapshot(ctx, log, nickname).await
        }
        (Command::DeleteInstances, Target::Instance(nickname)) => {
            instances::delete(ctx, log, nickname).await
        }
        (Command::CreateSnapshotImages, Target::Instance(nickname)) => {
            images::create_snapshot(ctx, log, nickname).await
        }
        (Command::DeleteSnapshotImages, Target::Instance(nickname)) => {
            images::delete_snapshot(ctx, log, nickname).await
        }
        (Command::PingInstances, Target::Instance(nickname)) => {
            services::ping(ctx, log, nickname).await
        }
        (Command::InstallServices, Target::Instance(nickname)) => {
            services::install(ctx, log, nickname).await
        }
        (Command::ConfigServices, Target::Instance(nickname)) => {
            services::run_phase(ctx, log, nickname, ServicePhase::Config).await
        }
        (Command::StartServices, Target::Instance(nickname)) => {
            services::run_phase(ctx, log, nickname, ServicePhase::Start).await
        }
        (Command::StopServices, Target::Instance(nickname)) => {
            services::run_phase(ctx, log, nickname, ServicePhase::Stop).await
        }

        (Command::CreateVolumes, Target::Volume { instance, volume }) => {
            volumes::create(ctx, log, instance, volume).await
        }
        (Command::AttachVolumes, Target::Volume { instance, volume }) => {
            volumes::attach(ctx, log, instance, volume).await
        }
        (Command::DetachVolumes, Target::Volume { instance, volume }) => {
            volumes::detach(ctx, log, instance, volume).await
        }
        (Command::DeleteVolumes, Target::Volume { instance, volume }) => {
            volumes::delete(ctx, log, instance, volume).await
        }

        (command, target) => Err(DeployError::Invalid(format!(
            "{} cannot run on target '{}'",
            command, target
        ))),
    }
}

/// Ensure a named resource, noting in the log whether it was created
pub(crate) async fn ensure_logged(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    spec: skyfleet_cloud::ResourceSpec,
    timeout: std::time::Duration,
) -> Result<String> {
    let kind = spec.kind();
    let ensured = ctx.reconciler.ensure(&spec, timeout).await?;
    if ensured.is_created() {
        log.add(format!("created {} {}: {}", kind, spec.name, ensured.id()));
    } else {
        log.add(format!("{} {} already there: {}", kind, spec.name, ensured.id()));
    }
    Ok(ensured.into_id())
}

/// Perform an action whose effect may already be in place
pub(crate) async fn perform_once(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    action: skyfleet_cloud::ResourceAction,
) -> Result<()> {
    match ctx.reconciler.client().perform(&action).await {
        Ok(()) => {
            log.add(format!("{}", action));
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            log.add(format!("{}: already done", action));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Like `Reconciler::find`, but gone resources count as absent
pub(crate) async fn find_present(
    ctx: &TaskContext,
    kind: skyfleet_cloud::ResourceKind,
    name: &str,
) -> Result<Option<skyfleet_cloud::ObservedResource>> {
    match ctx.reconciler.find_live(kind, name).await {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete by name, noting the outcome in the log
pub(crate) async fn delete_logged(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    kind: skyfleet_cloud::ResourceKind,
    name: &str,
    timeout: std::time::Duration,
) -> Result<()> {
    match ctx.reconciler.delete(kind, name, timeout).await? {
        skyfleet_cloud::Removal::Absent => {
            log.add(format!("{} {} not found, nothing to delete", kind, name))
        }
        skyfleet_cloud::Removal::Deleted(id) => log.add(format!("deleted {} {}: {}", kind, name, id)),
    }
    Ok(())
}
