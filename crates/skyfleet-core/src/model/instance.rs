//! Instance, volume and service definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role an instance plays in the deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePurpose {
    Bastion,
    Cassandra,
    #[default]
    Daemon,
    Rabbitmq,
    Prometheus,
}

impl std::fmt::Display for InstancePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstancePurpose::Bastion => write!(f, "bastion"),
            InstancePurpose::Cassandra => write!(f, "cassandra"),
            InstancePurpose::Daemon => write!(f, "daemon"),
            InstancePurpose::Rabbitmq => write!(f, "rabbitmq"),
            InstancePurpose::Prometheus => write!(f, "prometheus"),
        }
    }
}

/// A compute instance declared in the project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDef {
    pub purpose: InstancePurpose,

    /// Host name; also the cloud `Name` tag of the instance and of its snapshot image
    pub inst_name: String,

    pub security_group_name: String,

    /// Key pair installed for the root user
    #[serde(default)]
    pub root_key_name: String,

    /// Private address inside the subnet
    pub ip_address: String,

    /// Floating IP to associate (bastion only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip_address_name: Option<String>,

    /// Runtime-filled public address
    #[serde(default)]
    pub external_ip_address: String,

    pub flavor: String,

    pub image_id: String,

    pub subnet_name: String,

    /// Volumes by nickname
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeDef>,

    #[serde(default)]
    pub service: ServiceDef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_instance_profile: Option<String>,
}

impl InstanceDef {
    /// Address used to reach this instance over SSH.
    ///
    /// Instances with a floating IP are reached on it; `None` means the floating
    /// IP was requested but has not been looked up yet.
    pub fn best_ip_address(&self) -> Option<&str> {
        match &self.external_ip_address_name {
            Some(_) if self.external_ip_address.is_empty() => None,
            Some(_) => Some(&self.external_ip_address),
            None => Some(&self.ip_address),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeDef {
    /// Cloud `Name` tag of the volume
    pub name: String,
    pub mount_point: String,
    /// Size in GiB
    pub size: u32,
    #[serde(rename = "type", default = "default_volume_type")]
    pub volume_type: String,
    /// chmod mode applied to the mount point, e.g. 777
    pub permissions: u32,
    /// chown owner of the mount point
    pub owner: String,
    pub availability_zone: String,
}

fn default_volume_type() -> String {
    "gp2".to_string()
}

/// Service scripts and their environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDef {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cmd: ServiceCommands,
}

/// Script paths, relative to the project's scripts directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCommands {
    #[serde(default)]
    pub install: Vec<String>,
    #[serde(default)]
    pub config: Vec<String>,
    #[serde(default)]
    pub start: Vec<String>,
    #[serde(default)]
    pub stop: Vec<String>,
}

/// Lifecycle phase of a service script list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Install,
    Config,
    Start,
    Stop,
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServicePhase::Install => write!(f, "install"),
            ServicePhase::Config => write!(f, "config"),
            ServicePhase::Start => write!(f, "start"),
            ServicePhase::Stop => write!(f, "stop"),
        }
    }
}

impl ServiceCommands {
    pub fn scripts(&self, phase: ServicePhase) -> &[String] {
        match phase {
            ServicePhase::Install => &self.install,
            ServicePhase::Config => &self.config,
            ServicePhase::Start => &self.start,
            ServicePhase::Stop => &self.stop,
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.install
            .iter()
            .chain(&self.config)
            .chain(&self.start)
            .chain(&self.stop)
    }
}
