//! Resource vocabulary shared by every cloud client

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    SecurityGroup,
    InternetGateway,
    NatGateway,
    RouteTable,
    FloatingIp,
    Volume,
    Instance,
    Image,
    Snapshot,
    /// Read-only: looked up by key name, never created
    KeyPair,
    /// Read-only: looked up by flavor name, never created
    InstanceType,
}

impl ResourceKind {
    /// Kinds that carry deployment tags and show up in deployment listings
    pub const TAGGED: [ResourceKind; 11] = [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::InternetGateway,
        ResourceKind::NatGateway,
        ResourceKind::RouteTable,
        ResourceKind::FloatingIp,
        ResourceKind::Volume,
        ResourceKind::Instance,
        ResourceKind::Image,
        ResourceKind::Snapshot,
    ];

    /// How an observed state of this kind should be treated by the reconciler
    pub fn classify(self, state: ResourceState) -> Presence {
        use ResourceState::*;
        match (self, state) {
            (_, Terminated | Deleted | Deregistered) => Presence::Absent,
            // Failed NAT gateways linger for a while but hold nothing
            (ResourceKind::NatGateway, Failed) => Presence::Absent,
            (_, Pending) => Presence::Converging,
            (ResourceKind::Instance, Running) => Presence::Ready,
            (ResourceKind::Instance, _) => Presence::Invalid,
            (_, Available | InUse | Running) => Presence::Ready,
            _ => Presence::Invalid,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Vpc => write!(f, "vpc"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::SecurityGroup => write!(f, "security group"),
            ResourceKind::InternetGateway => write!(f, "internet gateway"),
            ResourceKind::NatGateway => write!(f, "nat gateway"),
            ResourceKind::RouteTable => write!(f, "route table"),
            ResourceKind::FloatingIp => write!(f, "floating ip"),
            ResourceKind::Volume => write!(f, "volume"),
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Snapshot => write!(f, "snapshot"),
            ResourceKind::KeyPair => write!(f, "key pair"),
            ResourceKind::InstanceType => write!(f, "instance type"),
        }
    }
}

/// Normalised lifecycle state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceState {
    Pending,
    Available,
    Running,
    InUse,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Deleting,
    Deleted,
    Deregistered,
    Failed,
    Unknown,
}

impl ResourceState {
    /// Map a provider state string onto the normalised states
    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "pending" | "creating" | "transient" => ResourceState::Pending,
            "available" | "completed" | "attached" => ResourceState::Available,
            "running" => ResourceState::Running,
            "in-use" => ResourceState::InUse,
            "stopping" => ResourceState::Stopping,
            "stopped" => ResourceState::Stopped,
            "shutting-down" => ResourceState::ShuttingDown,
            "terminated" => ResourceState::Terminated,
            "deleting" => ResourceState::Deleting,
            "deleted" => ResourceState::Deleted,
            "deregistered" => ResourceState::Deregistered,
            "failed" | "error" | "invalid" => ResourceState::Failed,
            _ => ResourceState::Unknown,
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Pending => write!(f, "pending"),
            ResourceState::Available => write!(f, "available"),
            ResourceState::Running => write!(f, "running"),
            ResourceState::InUse => write!(f, "in-use"),
            ResourceState::Stopping => write!(f, "stopping"),
            ResourceState::Stopped => write!(f, "stopped"),
            ResourceState::ShuttingDown => write!(f, "shutting-down"),
            ResourceState::Terminated => write!(f, "terminated"),
            ResourceState::Deleting => write!(f, "deleting"),
            ResourceState::Deleted => write!(f, "deleted"),
            ResourceState::Deregistered => write!(f, "deregistered"),
            ResourceState::Failed => write!(f, "failed"),
            ResourceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reconciler's reading of an observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Presence {
    /// In the desired state
    Ready,
    /// On its way to the desired state
    Converging,
    /// Exists in a state that cannot be reconciled automatically
    Invalid,
    /// Gone for all practical purposes (terminated, deleted, deregistered)
    Absent,
}

/// Attachment state of a volume, internet gateway or floating IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    Attaching,
    Attached,
    Detaching,
    Detached,
}

impl AttachmentState {
    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "attaching" => AttachmentState::Attaching,
            // Internet gateways report "available" once attached
            "attached" | "available" | "busy" => AttachmentState::Attached,
            "detaching" => AttachmentState::Detaching,
            _ => AttachmentState::Detached,
        }
    }
}

impl std::fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentState::Attaching => write!(f, "attaching"),
            AttachmentState::Attached => write!(f, "attached"),
            AttachmentState::Detaching => write!(f, "detaching"),
            AttachmentState::Detached => write!(f, "detached"),
        }
    }
}

/// Link from a resource to the thing it is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Instance id (volume, floating IP) or VPC id (internet gateway)
    pub target_id: String,
    /// Device name, volumes only
    pub device: Option<String>,
    pub state: AttachmentState,
}

impl Attachment {
    pub fn new(target_id: impl Into<String>, state: AttachmentState) -> Self {
        Self {
            target_id: target_id.into(),
            device: None,
            state,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
}

/// A resource as reported by the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub kind: ResourceKind,

    /// Provider-assigned identifier
    pub id: String,

    /// Value of the `Name` tag (or key name for key pairs)
    pub name: Option<String>,

    pub state: ResourceState,

    pub tags: BTreeMap<String, String>,

    /// Owning VPC for subnets, security groups and route tables
    pub parent_id: Option<String>,

    /// Public address of a floating IP
    pub address: Option<String>,

    pub attachments: Vec<Attachment>,

    /// Snapshots backing an image
    pub snapshot_ids: Vec<String>,

    /// Main route table of its VPC
    pub is_main: bool,

    /// Name of the IAM instance profile associated with an instance
    pub instance_profile: Option<String>,
}

impl ObservedResource {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            name: None,
            state: ResourceState::Unknown,
            tags: BTreeMap::new(),
            parent_id: None,
            address: None,
            attachments: Vec::new(),
            snapshot_ids: Vec::new(),
            is_main: false,
            instance_profile: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.tags.insert(crate::NAME_TAG.to_string(), name.clone());
        self.name = Some(name);
        self
    }

    pub fn with_state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn presence(&self) -> Presence {
        self.kind.classify(self.state)
    }

    /// First attachment that is not detached
    pub fn active_attachment(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.state != AttachmentState::Detached)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Describe filter
///
/// All set criteria must match. `name` matches the `Name` tag, except for key
/// pairs and instance types where it is the provider-side name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: ResourceKind,
    pub id: Option<String>,
    pub name: Option<String>,
    pub tags: Vec<(String, String)>,
    pub parent_id: Option<String>,
    pub main_only: bool,
}

impl Query {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            id: None,
            name: None,
            tags: Vec::new(),
            parent_id: None,
            main_only: false,
        }
    }

    pub fn by_id(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::new(kind).with_id(id)
    }

    pub fn by_name(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::new(kind).with_name(name)
    }

    /// The route table AWS creates alongside a VPC
    pub fn main_route_table(vpc_id: impl Into<String>) -> Self {
        let mut query = Self::new(ResourceKind::RouteTable).with_parent(vpc_id);
        query.main_only = true;
        query
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Whether `resource` satisfies this query
    pub fn matches(&self, resource: &ObservedResource) -> bool {
        resource.kind == self.kind
            && self.id.as_ref().is_none_or(|id| *id == resource.id)
            && self
                .name
                .as_ref()
                .is_none_or(|name| resource.name.as_ref() == Some(name))
            && self
                .tags
                .iter()
                .all(|(k, v)| resource.tags.get(k) == Some(v))
            && self
                .parent_id
                .as_ref()
                .is_none_or(|p| resource.parent_id.as_ref() == Some(p))
            && (!self.main_only || resource.is_main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_terminal_states_as_absent() {
        for kind in ResourceKind::TAGGED {
            assert_eq!(kind.classify(ResourceState::Terminated), Presence::Absent);
            assert_eq!(kind.classify(ResourceState::Deleted), Presence::Absent);
        }
    }

    #[test]
    fn test_classify_instance() {
        let kind = ResourceKind::Instance;
        assert_eq!(kind.classify(ResourceState::Running), Presence::Ready);
        assert_eq!(kind.classify(ResourceState::Pending), Presence::Converging);
        assert_eq!(kind.classify(ResourceState::Stopped), Presence::Invalid);
        assert_eq!(kind.classify(ResourceState::ShuttingDown), Presence::Invalid);
    }

    #[test]
    fn test_classify_nat_gateway_failed_is_absent() {
        assert_eq!(
            ResourceKind::NatGateway.classify(ResourceState::Failed),
            Presence::Absent
        );
        assert_eq!(
            ResourceKind::Image.classify(ResourceState::Failed),
            Presence::Invalid
        );
    }

    #[test]
    fn test_state_from_provider() {
        assert_eq!(ResourceState::from_provider("in-use"), ResourceState::InUse);
        assert_eq!(ResourceState::from_provider("shutting-down"), ResourceState::ShuttingDown);
        assert_eq!(ResourceState::from_provider("completed"), ResourceState::Available);
        assert_eq!(ResourceState::from_provider("weird"), ResourceState::Unknown);
    }

    #[test]
    fn test_query_matches() {
        let vol = ObservedResource::new(ResourceKind::Volume, "vol-1")
            .with_name("data")
            .with_state(ResourceState::Available)
            .with_tag(crate::DEPLOYMENT_NAME_TAG, "sample");

        assert!(Query::by_name(ResourceKind::Volume, "data").matches(&vol));
        assert!(Query::by_id(ResourceKind::Volume, "vol-1").matches(&vol));
        assert!(
            Query::new(ResourceKind::Volume)
                .with_tag(crate::DEPLOYMENT_NAME_TAG, "sample")
                .matches(&vol)
        );
        assert!(!Query::by_name(ResourceKind::Instance, "data").matches(&vol));
        assert!(!Query::by_name(ResourceKind::Volume, "other").matches(&vol));
        assert!(!Query::main_route_table("vpc-1").matches(&vol));
    }
}
