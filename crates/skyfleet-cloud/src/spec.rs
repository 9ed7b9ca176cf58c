//! Desired-state specifications and non-create mutations

use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource to create
///
/// The reconciler adds the `Name` tag and the deployment tags before handing
/// the spec to the client, so `tags` only needs extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub config: ResourceConfig,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, config: ResourceConfig) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            config,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.config.kind()
    }
}

/// Kind-specific creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceConfig {
    Vpc {
        cidr: String,
    },
    Subnet {
        vpc_id: String,
        cidr: String,
        availability_zone: String,
    },
    SecurityGroup {
        vpc_id: String,
        description: String,
    },
    InternetGateway,
    NatGateway {
        subnet_id: String,
        allocation_id: String,
    },
    RouteTable {
        vpc_id: String,
    },
    FloatingIp,
    Volume {
        availability_zone: String,
        size_gb: u32,
        volume_type: String,
    },
    Instance(InstanceConfig),
    /// Snapshot image of an existing instance
    Image {
        instance_id: String,
    },
}

impl ResourceConfig {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceConfig::Vpc { .. } => ResourceKind::Vpc,
            ResourceConfig::Subnet { .. } => ResourceKind::Subnet,
            ResourceConfig::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            ResourceConfig::InternetGateway => ResourceKind::InternetGateway,
            ResourceConfig::NatGateway { .. } => ResourceKind::NatGateway,
            ResourceConfig::RouteTable { .. } => ResourceKind::RouteTable,
            ResourceConfig::FloatingIp => ResourceKind::FloatingIp,
            ResourceConfig::Volume { .. } => ResourceKind::Volume,
            ResourceConfig::Instance(_) => ResourceKind::Instance,
            ResourceConfig::Image { .. } => ResourceKind::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub instance_type: String,
    pub image_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub private_ip: String,
    pub key_name: String,
}

/// Where a route sends its traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    InternetGateway(String),
    NatGateway(String),
}

impl RouteTarget {
    pub fn id(&self) -> &str {
        match self {
            RouteTarget::InternetGateway(id) | RouteTarget::NatGateway(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficDirection {
    Ingress,
    Egress,
}

/// A single security group permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub protocol: String,
    pub port: u16,
    pub cidr: String,
    pub direction: TrafficDirection,
}

/// Mutations that are not "create this named resource"
///
/// Deleting an image deregisters it and deleting a floating IP releases it;
/// both go through [`crate::CloudClient::delete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResourceAction {
    AttachVolume {
        volume_id: String,
        instance_id: String,
        device: String,
    },
    DetachVolume {
        volume_id: String,
        instance_id: String,
        device: String,
    },
    AssociateAddress {
        allocation_id: String,
        instance_id: String,
    },
    AttachInternetGateway {
        gateway_id: String,
        vpc_id: String,
    },
    DetachInternetGateway {
        gateway_id: String,
        vpc_id: String,
    },
    AssociateRouteTable {
        route_table_id: String,
        subnet_id: String,
    },
    CreateRoute {
        route_table_id: String,
        destination_cidr: String,
        target: RouteTarget,
    },
    AuthorizeRule {
        group_id: String,
        rule: SecurityRule,
    },
    StopInstance {
        instance_id: String,
    },
    AssociateInstanceProfile {
        instance_id: String,
        profile_name: String,
    },
}

impl std::fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceAction::AttachVolume {
                volume_id,
                instance_id,
                device,
            } => write!(f, "attach volume {} to {} at {}", volume_id, instance_id, device),
            ResourceAction::DetachVolume {
                volume_id,
                instance_id,
                ..
            } => write!(f, "detach volume {} from {}", volume_id, instance_id),
            ResourceAction::AssociateAddress {
                allocation_id,
                instance_id,
            } => write!(f, "associate address {} with {}", allocation_id, instance_id),
            ResourceAction::AttachInternetGateway { gateway_id, vpc_id } => {
                write!(f, "attach internet gateway {} to {}", gateway_id, vpc_id)
            }
            ResourceAction::DetachInternetGateway { gateway_id, vpc_id } => {
                write!(f, "detach internet gateway {} from {}", gateway_id, vpc_id)
            }
            ResourceAction::AssociateRouteTable {
                route_table_id,
                subnet_id,
            } => write!(f, "associate route table {} with {}", route_table_id, subnet_id),
            ResourceAction::CreateRoute {
                route_table_id,
                destination_cidr,
                target,
            } => write!(
                f,
                "create route {} -> {} in {}",
                destination_cidr,
                target.id(),
                route_table_id
            ),
            ResourceAction::AuthorizeRule { group_id, rule } => write!(
                f,
                "authorize {:?} {}/{} from {} in {}",
                rule.direction, rule.protocol, rule.port, rule.cidr, group_id
            ),
            ResourceAction::StopInstance { instance_id } => {
                write!(f, "stop instance {}", instance_id)
            }
            ResourceAction::AssociateInstanceProfile {
                instance_id,
                profile_name,
            } => write!(
                f,
                "associate instance profile {} with {}",
                profile_name, instance_id
            ),
        }
    }
}
