use super::{InstanceDef, InstancePurpose, NetworkDef, SecurityGroupDef, SshConfig};
use crate::loader::BASTION_IP_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEPLOY_PROVIDER_AWS: &str = "aws";

/// A deployment: everything skyfleet creates, configures and tears down.
///
/// Loaded once per invocation and never persisted back. Identifiers of cloud
/// resources are not stored here; they are looked up by name every time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub deployment_name: String,

    pub ssh_config: SshConfig,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Security groups by nickname
    #[serde(default)]
    pub security_groups: BTreeMap<String, SecurityGroupDef>,

    pub network: NetworkDef,

    /// Instances by nickname
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceDef>,

    #[serde(default = "default_provider")]
    pub deploy_provider_name: String,

    /// Directory holding service scripts, relative to the project file
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Directory containing the project file
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_provider() -> String {
    DEPLOY_PROVIDER_AWS.to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

impl Project {
    /// Absolute location of the scripts directory
    pub fn scripts_path(&self) -> PathBuf {
        self.root.join(&self.scripts_dir)
    }

    pub fn instance_nicknames(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    /// Instances of a given purpose, ordered by nickname
    pub fn instances_with_purpose(
        &self,
        purpose: InstancePurpose,
    ) -> impl Iterator<Item = (&String, &InstanceDef)> {
        self.instances
            .iter()
            .filter(move |(_, def)| def.purpose == purpose)
    }

    /// Record the bastion's public address everywhere it is needed:
    /// the SSH config, the instance carrying the floating IP, and any
    /// service env value using the placeholder.
    pub fn populate_bastion_address(&mut self, ip_address: &str) {
        let ip_name = self.ssh_config.bastion_external_ip_address_name.clone();
        self.ssh_config.external_ip_address = ip_address.to_string();

        for def in self.instances.values_mut() {
            if def.external_ip_address_name.as_deref() == Some(ip_name.as_str()) {
                def.external_ip_address = ip_address.to_string();
            }
            for value in def.service.env.values_mut() {
                if value.contains(BASTION_IP_PLACEHOLDER) {
                    *value = value.replace(BASTION_IP_PLACEHOLDER, ip_address);
                }
            }
        }
    }
}

/// Convergence budgets in seconds. Zero means "use the default".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub create_instance: u64,
    pub delete_instance: u64,
    pub create_nat_gateway: u64,
    pub delete_nat_gateway: u64,
    pub create_network: u64,
    pub attach_volume: u64,
    pub detach_volume: u64,
    pub create_volume: u64,
    pub delete_volume: u64,
    pub create_image: u64,
    pub stop_instance: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create_instance: 120,
            delete_instance: 600,
            // NAT gateways really take that long, both ways
            create_nat_gateway: 180,
            delete_nat_gateway: 180,
            create_network: 120,
            attach_volume: 30,
            detach_volume: 30,
            create_volume: 60,
            delete_volume: 60,
            create_image: 600,
            stop_instance: 300,
        }
    }
}

impl Timeouts {
    /// Replace zero values with defaults
    pub fn apply_defaults(&mut self) {
        let defaults = Timeouts::default();
        let pairs = [
            (&mut self.create_instance, defaults.create_instance),
            (&mut self.delete_instance, defaults.delete_instance),
            (&mut self.create_nat_gateway, defaults.create_nat_gateway),
            (&mut self.delete_nat_gateway, defaults.delete_nat_gateway),
            (&mut self.create_network, defaults.create_network),
            (&mut self.attach_volume, defaults.attach_volume),
            (&mut self.detach_volume, defaults.detach_volume),
            (&mut self.create_volume, defaults.create_volume),
            (&mut self.delete_volume, defaults.delete_volume),
            (&mut self.create_image, defaults.create_image),
            (&mut self.stop_instance, defaults.stop_instance),
        ];
        for (value, default) in pairs {
            if *value == 0 {
                *value = default;
            }
        }
    }
}
