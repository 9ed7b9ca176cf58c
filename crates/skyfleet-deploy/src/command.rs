//! Command names

use crate::error::DeployError;
use std::fmt;
use std::str::FromStr;

/// What a command fans out over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Read-only queries against the cloud, no project needed
    Listing,
    /// One task for the whole deployment
    Project,
    /// One task per matched instance
    Instances,
    /// One task per volume of each matched instance
    Volumes,
    /// A sequence of other commands
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ListDeployments,
    ListDeploymentResources,
    CreateFloatingIps,
    DeleteFloatingIps,
    CreateNetworking,
    DeleteNetworking,
    CreateSecurityGroups,
    DeleteSecurityGroups,
    CreateVolumes,
    AttachVolumes,
    DetachVolumes,
    DeleteVolumes,
    CreateInstances,
    DeleteInstances,
    PingInstances,
    InstallServices,
    ConfigServices,
    StartServices,
    StopServices,
    CreateSnapshotImages,
    CreateInstancesFromSnapshotImages,
    DeleteSnapshotImages,
    CheckCassandraStatus,
    DeploymentCreate,
    DeploymentCreateImages,
    DeploymentRestoreInstances,
    DeploymentDeleteImages,
    DeploymentDelete,
}

impl Command {
    pub const ALL: [Command; 28] = [
        Command::ListDeployments,
        Command::ListDeploymentResources,
        Command::CreateFloatingIps,
        Command::DeleteFloatingIps,
        Command::CreateNetworking,
        Command::DeleteNetworking,
        Command::CreateSecurityGroups,
        Command::DeleteSecurityGroups,
        Command::CreateVolumes,
        Command::AttachVolumes,
        Command::DetachVolumes,
        Command::DeleteVolumes,
        Command::CreateInstances,
        Command::DeleteInstances,
        Command::PingInstances,
        Command::InstallServices,
        Command::ConfigServices,
        Command::StartServices,
        Command::StopServices,
        Command::CreateSnapshotImages,
        Command::CreateInstancesFromSnapshotImages,
        Command::DeleteSnapshotImages,
        Command::CheckCassandraStatus,
        Command::DeploymentCreate,
        Command::DeploymentCreateImages,
        Command::DeploymentRestoreInstances,
        Command::DeploymentDeleteImages,
        Command::DeploymentDelete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::ListDeployments => "list_deployments",
            Command::ListDeploymentResources => "list_deployment_resources",
            Command::CreateFloatingIps => "create_floating_ips",
            Command::DeleteFloatingIps => "delete_floating_ips",
            Command::CreateNetworking => "create_networking",
            Command::DeleteNetworking => "delete_networking",
            Command::CreateSecurityGroups => "create_security_groups",
            Command::DeleteSecurityGroups => "delete_security_groups",
            Command::CreateVolumes => "create_volumes",
            Command::AttachVolumes => "attach_volumes",
            Command::DetachVolumes => "detach_volumes",
            Command::DeleteVolumes => "delete_volumes",
            Command::CreateInstances => "create_instances",
            Command::DeleteInstances => "delete_instances",
            Command::PingInstances => "ping_instances",
            Command::InstallServices => "install_services",
            Command::ConfigServices => "config_services",
            Command::StartServices => "start_services",
            Command::StopServices => "stop_services",
            Command::CreateSnapshotImages => "create_snapshot_images",
            Command::CreateInstancesFromSnapshotImages => "create_instances_from_snapshot_images",
            Command::DeleteSnapshotImages => "delete_snapshot_images",
            Command::CheckCassandraStatus => "check_cassandra_status",
            Command::DeploymentCreate => "deployment_create",
            Command::DeploymentCreateImages => "deployment_create_images",
            Command::DeploymentRestoreInstances => "deployment_restore_instances",
            Command::DeploymentDeleteImages => "deployment_delete_images",
            Command::DeploymentDelete => "deployment_delete",
        }
    }

    pub fn scope(self) -> CommandScope {
        match self {
            Command::ListDeployments | Command::ListDeploymentResources => CommandScope::Listing,
            Command::CreateFloatingIps
            | Command::DeleteFloatingIps
            | Command::CreateNetworking
            | Command::DeleteNetworking
            | Command::CreateSecurityGroups
            | Command::DeleteSecurityGroups
            | Command::CheckCassandraStatus => CommandScope::Project,
            Command::CreateVolumes
            | Command::AttachVolumes
            | Command::DetachVolumes
            | Command::DeleteVolumes => CommandScope::Volumes,
            Command::CreateInstances
            | Command::DeleteInstances
            | Command::PingInstances
            | Command::InstallServices
            | Command::ConfigServices
            | Command::StartServices
            | Command::StopServices
            | Command::CreateSnapshotImages
            | Command::CreateInstancesFromSnapshotImages
            | Command::DeleteSnapshotImages => CommandScope::Instances,
            Command::DeploymentCreate
            | Command::DeploymentCreateImages
            | Command::DeploymentRestoreInstances
            | Command::DeploymentDeleteImages
            | Command::DeploymentDelete => CommandScope::Composite,
        }
    }

    /// Whether the command takes a target pattern
    pub fn requires_targets(self) -> bool {
        matches!(self.scope(), CommandScope::Instances | CommandScope::Volumes)
    }

    /// Whether the command talks to hosts, so the bastion address must be known first
    pub fn needs_bastion(self) -> bool {
        matches!(
            self,
            Command::CreateInstances
                | Command::CreateInstancesFromSnapshotImages
                | Command::DeleteInstances
                | Command::PingInstances
                | Command::InstallServices
                | Command::ConfigServices
                | Command::StartServices
                | Command::StopServices
                | Command::AttachVolumes
                | Command::DetachVolumes
                | Command::CheckCassandraStatus
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| DeployError::Invalid(format!("unknown command '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>().unwrap(), command);
        }
        assert!("deploy_everything".parse::<Command>().is_err());
    }

    #[test]
    fn test_targets_required_for_instances_and_volumes() {
        assert!(Command::PingInstances.requires_targets());
        assert!(Command::AttachVolumes.requires_targets());
        assert!(!Command::CreateNetworking.requires_targets());
        assert!(!Command::DeploymentCreate.requires_targets());
        assert!(!Command::ListDeployments.requires_targets());
    }
}
