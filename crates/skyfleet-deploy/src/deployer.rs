//! Command entry point
//!
//! [`Deployer`] owns the loaded project and turns one command plus a target
//! pattern into executor runs: composites go through the sequencer, every
//! primitive step becomes one fan-out.

use crate::command::{Command, CommandScope};
use crate::context::{DeployOptions, ShellFactory, TaskContext};
use crate::error::{DeployError, Result};
use crate::executor::Executor;
use crate::ops::{self, Target};
use crate::sequencer::{self, StepRunner};
use async_trait::async_trait;
use skyfleet_cloud::{Reconciler, ResourceKind};
use skyfleet_core::{Project, resolve_targets};
use skyfleet_remote::RemoteShell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Deployer {
    project: Project,
    reconciler: Reconciler,
    shell_factory: Arc<dyn ShellFactory>,
    shell: Option<Arc<dyn RemoteShell>>,
    options: DeployOptions,
    executor: Executor,
}

impl Deployer {
    pub fn new(
        project: Project,
        reconciler: Reconciler,
        shell_factory: Arc<dyn ShellFactory>,
        executor: Executor,
        options: DeployOptions,
    ) -> Self {
        Self {
            project,
            reconciler,
            shell_factory,
            shell: None,
            options,
            executor,
        }
    }

    /// The project, including addresses filled in while running
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Run a primitive or composite command
    pub async fn run(&mut self, command: Command, targets: &str) -> Result<()> {
        match sequencer::expand(command) {
            Some(steps) => {
                info!("{} expands to {} steps", command, steps.len());
                sequencer::run_sequence(self, steps).await
            }
            None => self.run_step(command, targets).await,
        }
    }

    /// Look up the bastion floating IP and open the remote shell through it
    pub async fn populate_bastion(&mut self) -> Result<()> {
        if self.shell.is_some() {
            return Ok(());
        }
        let ip_name = self.project.ssh_config.bastion_external_ip_address_name.clone();
        let ip = self
            .reconciler
            .find_live(ResourceKind::FloatingIp, &ip_name)
            .await
            .map_err(DeployError::missing(
                format!("floating ip {}", ip_name),
                "create_floating_ips",
            ))?;
        let address = ip.address.ok_or_else(|| {
            DeployError::Invalid(format!("floating ip {} has no address", ip_name))
        })?;

        debug!("bastion {} is at {}", ip_name, address);
        self.project.populate_bastion_address(&address);
        self.shell = Some(self.shell_factory.open(&self.project.ssh_config)?);
        Ok(())
    }

    /// One task per target, keyed by the target's display name
    fn tasks_for(&self, command: Command, targets: &str) -> Result<Vec<Target>> {
        match command.scope() {
            CommandScope::Listing | CommandScope::Project => Ok(vec![Target::Deployment]),
            CommandScope::Instances => Ok(self
                .resolve_instances(targets)?
                .into_iter()
                .map(Target::Instance)
                .collect()),
            CommandScope::Volumes => {
                let mut tasks = Vec::new();
                for nickname in self.resolve_instances(targets)? {
                    if let Some(def) = self.project.instances.get(&nickname) {
                        for volume in def.volumes.keys() {
                            tasks.push(Target::Volume {
                                instance: nickname.clone(),
                                volume: volume.clone(),
                            });
                        }
                    }
                }
                Ok(tasks)
            }
            CommandScope::Composite => Err(DeployError::Invalid(format!(
                "{} is not a single step",
                command
            ))),
        }
    }

    fn resolve_instances(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(resolve_targets(pattern, self.project.instances.keys(), "instance")?)
    }

    /// Check what new instances will reference before creating any of them
    async fn preflight(&self, command: Command, tasks: &[Target]) -> Result<()> {
        let defs: Vec<_> = tasks
            .iter()
            .filter_map(|t| match t {
                Target::Instance(nickname) => self.project.instances.get(nickname),
                _ => None,
            })
            .collect();

        let flavors: BTreeSet<&str> = defs.iter().map(|d| d.flavor.as_str()).collect();
        for flavor in flavors {
            if self.reconciler.find(ResourceKind::InstanceType, flavor).await?.is_none() {
                return Err(DeployError::Invalid(format!("unknown flavor {}", flavor)));
            }
        }

        if command == Command::CreateInstances {
            let images: BTreeSet<&str> = defs.iter().map(|d| d.image_id.as_str()).collect();
            for image in images {
                if self
                    .reconciler
                    .describe_by_id(ResourceKind::Image, image)
                    .await?
                    .is_none()
                {
                    return Err(DeployError::Invalid(format!("image {} does not exist", image)));
                }
            }
        }

        let keys: BTreeSet<&str> = defs
            .iter()
            .map(|d| d.root_key_name.as_str())
            .filter(|k| !k.is_empty())
            .collect();
        for key in keys {
            if self.reconciler.find(ResourceKind::KeyPair, key).await?.is_none() {
                return Err(DeployError::Invalid(format!("key pair {} does not exist", key)));
            }
        }

        let reporter = self.executor.reporter();
        for def in defs {
            if let Some(host) = def.best_ip_address() {
                reporter.notice(&format!("ssh-keygen -f ~/.ssh/known_hosts -R {};", host));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StepRunner for Deployer {
    async fn run_step(&mut self, command: Command, targets: &str) -> Result<()> {
        let tasks = self.tasks_for(command, targets)?;
        if tasks.is_empty() {
            let verb = command.name().split('_').next().unwrap_or_default();
            self.executor
                .reporter()
                .notice(&format!("No volumes to {}", verb));
            return Ok(());
        }

        if command.needs_bastion() {
            self.populate_bastion().await?;
        }
        if matches!(
            command,
            Command::CreateInstances | Command::CreateInstancesFromSnapshotImages
        ) {
            self.preflight(command, &tasks).await?;
        }

        let ctx = Arc::new(TaskContext::new(
            self.project.clone(),
            self.reconciler.clone(),
            self.shell.clone(),
            self.options.clone(),
        ));
        let by_name: Arc<HashMap<String, Target>> =
            Arc::new(tasks.iter().map(|t| (t.to_string(), t.clone())).collect());
        let names: Vec<String> = tasks.iter().map(Target::to_string).collect();

        debug!("{} over {} target(s)", command, names.len());
        let report = self
            .executor
            .run_over_targets(names, |name| {
                let ctx = ctx.clone();
                let target = by_name.get(&name).cloned().unwrap_or(Target::Deployment);
                ops::run(ctx, command, target)
            })
            .await;
        report.into_result()
    }
}
