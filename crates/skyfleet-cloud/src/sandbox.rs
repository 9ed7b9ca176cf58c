//! In-memory cloud client
//!
//! Behaves like a small, well-mannered control plane: asynchronous operations
//! take a configurable number of describes to settle, terminated instances and
//! deleted NAT gateways stay visible, and dependency violations are reported
//! the way the real thing reports them. Used by tests across the workspace.

use crate::client::CloudClient;
use crate::error::{CloudError, Result};
use crate::resource::{
    Attachment, AttachmentState, ObservedResource, Presence, Query, ResourceKind, ResourceState,
};
use crate::spec::{ResourceAction, ResourceConfig, ResourceSpec, RouteTarget};
use crate::NAME_TAG;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Client operation, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOp {
    Describe,
    Create,
    Delete,
    Tag,
    Perform,
}

/// Change applied once an entry has been described enough times
#[derive(Debug, Clone)]
enum Settle {
    State(ResourceState),
    Attached,
    Detached,
    Remove,
}

#[derive(Debug, Clone)]
struct Entry {
    resource: ObservedResource,
    settle: Option<(u32, Settle)>,
    routes: BTreeSet<String>,
    rules: BTreeSet<String>,
}

impl Entry {
    fn new(resource: ObservedResource) -> Self {
        Self {
            resource,
            settle: None,
            routes: BTreeSet::new(),
            rules: BTreeSet::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.resource.presence() != Presence::Absent
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    next_id: u32,
    convergence: u32,
    failures: HashSet<(ResourceKind, SandboxOp)>,
    calls: HashMap<(ResourceKind, SandboxOp), usize>,
}

impl Inner {
    fn position(&self, kind: ResourceKind, id: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.resource.kind == kind && e.resource.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("{} {}", kind, id)))
    }

    fn entry_mut(&mut self, kind: ResourceKind, id: &str) -> Result<&mut Entry> {
        let index = self.position(kind, id)?;
        Ok(&mut self.entries[index])
    }

    fn require_live(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let index = self.position(kind, id)?;
        if self.entries[index].is_live() {
            Ok(())
        } else {
            Err(CloudError::NotFound(format!("{} {}", kind, id)))
        }
    }

    fn next_id(&mut self, kind: ResourceKind) -> String {
        self.next_id += 1;
        format!("{}-{:04}", id_prefix(kind), self.next_id)
    }

    fn record(&mut self, kind: ResourceKind, op: SandboxOp) -> Result<()> {
        *self.calls.entry((kind, op)).or_insert(0) += 1;
        if self.failures.contains(&(kind, op)) {
            return Err(CloudError::Api(format!("injected {:?} failure for {}", op, kind)));
        }
        Ok(())
    }

    /// Move `entry` towards its settled form, immediately when convergence is zero
    fn schedule(&mut self, index: usize, interim: Option<Settle>, settle: Settle) {
        let convergence = self.convergence;
        let entry = &mut self.entries[index];
        if convergence == 0 {
            apply(entry, settle);
        } else {
            if let Some(interim) = interim {
                apply(entry, interim);
            }
            entry.settle = Some((convergence, settle));
        }
    }

    fn has_live_child(&self, kind: ResourceKind, parent_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.resource.kind == kind
                && e.is_live()
                && !e.resource.is_main
                && e.resource.parent_id.as_deref() == Some(parent_id)
        })
    }

    fn has_live_attachment_to(&self, kind: ResourceKind, target_id: &str) -> bool {
        self.entries.iter().any(|e| {
            e.resource.kind == kind
                && e.resource
                    .active_attachment()
                    .is_some_and(|a| a.target_id == target_id)
        })
    }
}

fn apply(entry: &mut Entry, settle: Settle) {
    let resource = &mut entry.resource;
    match settle {
        Settle::State(state) => resource.state = state,
        Settle::Attached => {
            for attachment in &mut resource.attachments {
                attachment.state = AttachmentState::Attached;
            }
        }
        Settle::Detached => {
            resource.attachments.clear();
            resource.state = ResourceState::Available;
        }
        // Dropped from the entry list by the next describe
        Settle::Remove => resource.state = ResourceState::Deleted,
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vpc => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::InternetGateway => "igw",
        ResourceKind::NatGateway => "nat",
        ResourceKind::RouteTable => "rtb",
        ResourceKind::FloatingIp => "eipalloc",
        ResourceKind::Volume => "vol",
        ResourceKind::Instance => "i",
        ResourceKind::Image => "ami",
        ResourceKind::Snapshot => "snap",
        ResourceKind::KeyPair => "key",
        ResourceKind::InstanceType => "type",
    }
}

fn action_kind(action: &ResourceAction) -> ResourceKind {
    match action {
        ResourceAction::AttachVolume { .. } | ResourceAction::DetachVolume { .. } => {
            ResourceKind::Volume
        }
        ResourceAction::AssociateAddress { .. } => ResourceKind::FloatingIp,
        ResourceAction::AttachInternetGateway { .. }
        | ResourceAction::DetachInternetGateway { .. } => ResourceKind::InternetGateway,
        ResourceAction::AssociateRouteTable { .. } | ResourceAction::CreateRoute { .. } => {
            ResourceKind::RouteTable
        }
        ResourceAction::AuthorizeRule { .. } => ResourceKind::SecurityGroup,
        ResourceAction::StopInstance { .. } | ResourceAction::AssociateInstanceProfile { .. } => {
            ResourceKind::Instance
        }
    }
}

/// In-memory [`CloudClient`]
#[derive(Debug, Default)]
pub struct SandboxCloud {
    inner: Mutex<Inner>,
}

impl SandboxCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asynchronous operations settle after `describes` describes of the resource
    pub fn with_convergence(self, describes: u32) -> Self {
        self.lock().convergence = describes;
        self
    }

    /// Make every `op` on `kind` fail with an API error
    pub fn fail_on(&self, kind: ResourceKind, op: SandboxOp) {
        self.lock().failures.insert((kind, op));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self, kind: ResourceKind, op: SandboxOp) -> usize {
        self.lock().calls.get(&(kind, op)).copied().unwrap_or(0)
    }

    pub fn create_calls(&self, kind: ResourceKind) -> usize {
        self.calls(kind, SandboxOp::Create)
    }

    pub fn delete_calls(&self, kind: ResourceKind) -> usize {
        self.calls(kind, SandboxOp::Delete)
    }

    /// Seed a resource as if it had been created out of band
    pub fn insert(&self, resource: ObservedResource) {
        self.lock().entries.push(Entry::new(resource));
    }

    /// Seed a key pair, looked up by key name
    pub fn insert_key_pair(&self, key_name: &str) {
        self.insert(
            ObservedResource::new(ResourceKind::KeyPair, format!("key-{}", key_name))
                .with_name(key_name)
                .with_state(ResourceState::Available),
        );
    }

    /// Seed an instance type, looked up by flavor name
    pub fn insert_instance_type(&self, flavor: &str) {
        self.insert(
            ObservedResource::new(ResourceKind::InstanceType, flavor)
                .with_name(flavor)
                .with_state(ResourceState::Available),
        );
    }

    /// Seed a public image, looked up by id
    pub fn insert_image(&self, image_id: &str) {
        self.insert(
            ObservedResource::new(ResourceKind::Image, image_id).with_state(ResourceState::Available),
        );
    }

    pub fn set_state(&self, kind: ResourceKind, id: &str, state: ResourceState) {
        let mut inner = self.lock();
        if let Ok(entry) = inner.entry_mut(kind, id) {
            entry.resource.state = state;
            entry.settle = None;
        }
    }

    /// Snapshot of all resources of a kind, without settling anything
    pub fn resources(&self, kind: ResourceKind) -> Vec<ObservedResource> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.resource.kind == kind)
            .map(|e| e.resource.clone())
            .collect()
    }

    /// Routes of a route table, as `destination -> target id`
    pub fn routes(&self, route_table_id: &str) -> Vec<String> {
        let mut inner = self.lock();
        inner
            .entry_mut(ResourceKind::RouteTable, route_table_id)
            .map(|e| e.routes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rules of a security group, as `direction protocol/port cidr`
    pub fn rules(&self, group_id: &str) -> Vec<String> {
        let mut inner = self.lock();
        inner
            .entry_mut(ResourceKind::SecurityGroup, group_id)
            .map(|e| e.rules.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn instance_profile(&self, instance_id: &str) -> Option<String> {
        let mut inner = self.lock();
        inner
            .entry_mut(ResourceKind::Instance, instance_id)
            .ok()
            .and_then(|e| e.resource.instance_profile.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_locked(&self, inner: &mut Inner, spec: &ResourceSpec) -> Result<String> {
        let kind = spec.kind();
        let id = inner.next_id(kind);

        let mut resource = ObservedResource::new(kind, &id);
        resource.tags = spec.tags.clone();
        resource.name = Some(
            spec.tags
                .get(NAME_TAG)
                .cloned()
                .unwrap_or_else(|| spec.name.clone()),
        );

        // (initial state, settled state)
        let (initial, settled) = match &spec.config {
            ResourceConfig::Vpc { .. } => {
                let main_id = inner.next_id(ResourceKind::RouteTable);
                let mut main = ObservedResource::new(ResourceKind::RouteTable, main_id)
                    .with_state(ResourceState::Available)
                    .with_parent(&id);
                main.is_main = true;
                inner.entries.push(Entry::new(main));
                (ResourceState::Pending, ResourceState::Available)
            }
            ResourceConfig::Subnet { vpc_id, .. } => {
                inner.require_live(ResourceKind::Vpc, vpc_id)?;
                resource.parent_id = Some(vpc_id.clone());
                (ResourceState::Pending, ResourceState::Available)
            }
            ResourceConfig::SecurityGroup { vpc_id, .. }
            | ResourceConfig::RouteTable { vpc_id } => {
                inner.require_live(ResourceKind::Vpc, vpc_id)?;
                resource.parent_id = Some(vpc_id.clone());
                (ResourceState::Available, ResourceState::Available)
            }
            ResourceConfig::InternetGateway => (ResourceState::Available, ResourceState::Available),
            ResourceConfig::NatGateway {
                subnet_id,
                allocation_id,
            } => {
                inner.require_live(ResourceKind::Subnet, subnet_id)?;
                inner.require_live(ResourceKind::FloatingIp, allocation_id)?;
                resource.parent_id = Some(subnet_id.clone());
                (ResourceState::Pending, ResourceState::Available)
            }
            ResourceConfig::FloatingIp => {
                resource.address = Some(format!("203.0.113.{}", inner.next_id % 250 + 1));
                (ResourceState::Available, ResourceState::Available)
            }
            ResourceConfig::Volume { .. } => (ResourceState::Pending, ResourceState::Available),
            ResourceConfig::Instance(config) => {
                inner.require_live(ResourceKind::Subnet, &config.subnet_id)?;
                resource.parent_id = Some(config.subnet_id.clone());
                (ResourceState::Pending, ResourceState::Running)
            }
            ResourceConfig::Image { instance_id } => {
                inner.require_live(ResourceKind::Instance, instance_id)?;
                let snapshot_id = inner.next_id(ResourceKind::Snapshot);
                inner.entries.push(Entry::new(
                    ObservedResource::new(ResourceKind::Snapshot, &snapshot_id)
                        .with_state(ResourceState::Available),
                ));
                resource.snapshot_ids.push(snapshot_id);
                (ResourceState::Pending, ResourceState::Available)
            }
        };

        resource.state = initial;
        inner.entries.push(Entry::new(resource));
        let index = inner.entries.len() - 1;
        if initial != settled {
            inner.schedule(index, None, Settle::State(settled));
        }
        Ok(id)
    }

    fn delete_locked(&self, inner: &mut Inner, kind: ResourceKind, id: &str) -> Result<()> {
        let index = inner.position(kind, id)?;
        if !inner.entries[index].is_live() {
            return Err(CloudError::NotFound(format!("{} {}", kind, id)));
        }

        let resource = &inner.entries[index].resource;
        let attached = resource.active_attachment().is_some();
        match kind {
            ResourceKind::Volume | ResourceKind::FloatingIp | ResourceKind::InternetGateway
                if attached =>
            {
                return Err(CloudError::Conflict(format!("{} {} is in use", kind, id)));
            }
            ResourceKind::RouteTable if resource.is_main => {
                return Err(CloudError::Conflict(format!(
                    "main route table {} cannot be deleted",
                    id
                )));
            }
            ResourceKind::Vpc => {
                let dependent = [
                    ResourceKind::Subnet,
                    ResourceKind::SecurityGroup,
                    ResourceKind::RouteTable,
                ]
                .into_iter()
                .any(|child| inner.has_live_child(child, id))
                    || inner.has_live_attachment_to(ResourceKind::InternetGateway, id);
                if dependent {
                    return Err(CloudError::Conflict(format!(
                        "vpc {} has dependencies and cannot be deleted",
                        id
                    )));
                }
                inner.entries.retain(|e| {
                    !(e.resource.kind == ResourceKind::RouteTable
                        && e.resource.parent_id.as_deref() == Some(id))
                });
            }
            ResourceKind::Subnet => {
                if inner.has_live_child(ResourceKind::Instance, id)
                    || inner.has_live_child(ResourceKind::NatGateway, id)
                {
                    return Err(CloudError::Conflict(format!(
                        "subnet {} has dependencies and cannot be deleted",
                        id
                    )));
                }
            }
            _ => {}
        }

        let index = inner.position(kind, id)?;
        match kind {
            ResourceKind::Instance => inner.schedule(
                index,
                Some(Settle::State(ResourceState::ShuttingDown)),
                Settle::State(ResourceState::Terminated),
            ),
            ResourceKind::NatGateway => inner.schedule(
                index,
                Some(Settle::State(ResourceState::Deleting)),
                Settle::State(ResourceState::Deleted),
            ),
            ResourceKind::Image => {
                apply(
                    &mut inner.entries[index],
                    Settle::State(ResourceState::Deregistered),
                );
            }
            ResourceKind::Volume => inner.schedule(
                index,
                Some(Settle::State(ResourceState::Deleting)),
                Settle::Remove,
            ),
            _ => {
                inner.entries.remove(index);
            }
        }
        Ok(())
    }

    fn perform_locked(&self, inner: &mut Inner, action: &ResourceAction) -> Result<()> {
        match action {
            ResourceAction::AttachVolume {
                volume_id,
                instance_id,
                device,
            } => {
                inner.require_live(ResourceKind::Instance, instance_id)?;
                let index = inner.position(ResourceKind::Volume, volume_id)?;
                let volume = &mut inner.entries[index].resource;
                if volume.active_attachment().is_some() {
                    return Err(CloudError::Conflict(format!(
                        "volume {} is already attached",
                        volume_id
                    )));
                }
                volume.state = ResourceState::InUse;
                volume.attachments.push(
                    Attachment::new(instance_id.clone(), AttachmentState::Attaching)
                        .with_device(device.clone()),
                );
                inner.schedule(index, None, Settle::Attached);
            }
            ResourceAction::DetachVolume {
                volume_id,
                instance_id,
                ..
            } => {
                let index = inner.position(ResourceKind::Volume, volume_id)?;
                let volume = &mut inner.entries[index].resource;
                let attached_here = volume
                    .active_attachment()
                    .is_some_and(|a| a.target_id == *instance_id);
                if !attached_here {
                    return Err(CloudError::Conflict(format!(
                        "volume {} is not attached to {}",
                        volume_id, instance_id
                    )));
                }
                for attachment in &mut volume.attachments {
                    attachment.state = AttachmentState::Detaching;
                }
                inner.schedule(index, None, Settle::Detached);
            }
            ResourceAction::AssociateAddress {
                allocation_id,
                instance_id,
            } => {
                inner.require_live(ResourceKind::Instance, instance_id)?;
                let address = inner.entry_mut(ResourceKind::FloatingIp, allocation_id)?;
                let current = address
                    .resource
                    .active_attachment()
                    .map(|a| a.target_id.clone());
                match current {
                    Some(target) if target == *instance_id => {}
                    Some(target) => {
                        return Err(CloudError::Conflict(format!(
                            "address {} is associated with {}",
                            allocation_id, target
                        )));
                    }
                    None => address.resource.attachments.push(Attachment::new(
                        instance_id.clone(),
                        AttachmentState::Attached,
                    )),
                }
            }
            ResourceAction::AttachInternetGateway { gateway_id, vpc_id } => {
                inner.require_live(ResourceKind::Vpc, vpc_id)?;
                let gateway = inner.entry_mut(ResourceKind::InternetGateway, gateway_id)?;
                if gateway.resource.active_attachment().is_some() {
                    return Err(CloudError::Conflict(format!(
                        "internet gateway {} is already attached",
                        gateway_id
                    )));
                }
                gateway
                    .resource
                    .attachments
                    .push(Attachment::new(vpc_id.clone(), AttachmentState::Attached));
            }
            ResourceAction::DetachInternetGateway { gateway_id, vpc_id } => {
                let gateway = inner.entry_mut(ResourceKind::InternetGateway, gateway_id)?;
                let attached_here = gateway
                    .resource
                    .active_attachment()
                    .is_some_and(|a| a.target_id == *vpc_id);
                if !attached_here {
                    return Err(CloudError::Conflict(format!(
                        "internet gateway {} is not attached to {}",
                        gateway_id, vpc_id
                    )));
                }
                gateway.resource.attachments.clear();
            }
            ResourceAction::AssociateRouteTable {
                route_table_id,
                subnet_id,
            } => {
                inner.require_live(ResourceKind::Subnet, subnet_id)?;
                let table = inner.entry_mut(ResourceKind::RouteTable, route_table_id)?;
                if table
                    .resource
                    .attachments
                    .iter()
                    .any(|a| a.target_id == *subnet_id)
                {
                    return Err(CloudError::AlreadyExists(format!(
                        "route table {} is already associated with {}",
                        route_table_id, subnet_id
                    )));
                }
                table
                    .resource
                    .attachments
                    .push(Attachment::new(subnet_id.clone(), AttachmentState::Attached));
            }
            ResourceAction::CreateRoute {
                route_table_id,
                destination_cidr,
                target,
            } => {
                match target {
                    RouteTarget::InternetGateway(id) => {
                        inner.require_live(ResourceKind::InternetGateway, id)?
                    }
                    RouteTarget::NatGateway(id) => inner.require_live(ResourceKind::NatGateway, id)?,
                }
                let table = inner.entry_mut(ResourceKind::RouteTable, route_table_id)?;
                let route = format!("{} -> {}", destination_cidr, target.id());
                if !table.routes.insert(route) {
                    return Err(CloudError::AlreadyExists(format!(
                        "route {} already exists in {}",
                        destination_cidr, route_table_id
                    )));
                }
            }
            ResourceAction::AuthorizeRule { group_id, rule } => {
                let group = inner.entry_mut(ResourceKind::SecurityGroup, group_id)?;
                let key = format!(
                    "{:?} {}/{} {}",
                    rule.direction, rule.protocol, rule.port, rule.cidr
                );
                if !group.rules.insert(key) {
                    return Err(CloudError::AlreadyExists(format!(
                        "rule already present in {}",
                        group_id
                    )));
                }
            }
            ResourceAction::StopInstance { instance_id } => {
                let index = inner.position(ResourceKind::Instance, instance_id)?;
                let state = inner.entries[index].resource.state;
                match state {
                    ResourceState::Running => inner.schedule(
                        index,
                        Some(Settle::State(ResourceState::Stopping)),
                        Settle::State(ResourceState::Stopped),
                    ),
                    ResourceState::Stopping | ResourceState::Stopped => {}
                    state => {
                        return Err(CloudError::Conflict(format!(
                            "instance {} cannot be stopped in state {}",
                            instance_id, state
                        )));
                    }
                }
            }
            ResourceAction::AssociateInstanceProfile {
                instance_id,
                profile_name,
            } => {
                let instance = inner.entry_mut(ResourceKind::Instance, instance_id)?;
                match instance.resource.instance_profile.clone() {
                    Some(current) if &current == profile_name => {
                        return Err(CloudError::AlreadyExists(format!(
                            "{} is already associated with {}",
                            profile_name, instance_id
                        )));
                    }
                    Some(current) => {
                        return Err(CloudError::Conflict(format!(
                            "instance {} already has instance profile {}",
                            instance_id, current
                        )));
                    }
                    None => instance.resource.instance_profile = Some(profile_name.clone()),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for SandboxCloud {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn describe(&self, query: &Query) -> Result<Vec<ObservedResource>> {
        let mut inner = self.lock();
        inner.record(query.kind, SandboxOp::Describe)?;

        let mut found = Vec::new();
        for entry in inner.entries.iter_mut() {
            if !query.matches(&entry.resource) {
                continue;
            }
            if let Some((remaining, settle)) = entry.settle.take() {
                if remaining <= 1 {
                    apply(entry, settle);
                } else {
                    entry.settle = Some((remaining - 1, settle));
                }
            }
            found.push(entry.resource.clone());
        }

        // Terminated instances lose their addresses and volumes
        let terminated: HashSet<String> = inner
            .entries
            .iter()
            .filter(|e| e.resource.kind == ResourceKind::Instance && !e.is_live())
            .map(|e| e.resource.id.clone())
            .collect();
        if !terminated.is_empty() {
            for entry in inner.entries.iter_mut().filter(|e| {
                matches!(e.resource.kind, ResourceKind::FloatingIp | ResourceKind::Volume)
            }) {
                let before = entry.resource.attachments.len();
                entry
                    .resource
                    .attachments
                    .retain(|a| !terminated.contains(&a.target_id));
                if entry.resource.attachments.len() != before
                    && entry.resource.kind == ResourceKind::Volume
                {
                    entry.resource.state = ResourceState::Available;
                }
            }
            for resource in found.iter_mut() {
                let before = resource.attachments.len();
                resource
                    .attachments
                    .retain(|a| !terminated.contains(&a.target_id));
                if resource.attachments.len() != before && resource.kind == ResourceKind::Volume {
                    resource.state = ResourceState::Available;
                }
            }
        }

        // Removed resources vanish from describe results
        let removed = |r: &ObservedResource| {
            r.state == ResourceState::Deleted && r.kind != ResourceKind::NatGateway
        };
        inner.entries.retain(|e| !removed(&e.resource));
        found.retain(|r| !removed(r));

        debug!("sandbox describe {:?}: {} result(s)", query, found.len());
        Ok(found)
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<String> {
        let mut inner = self.lock();
        inner.record(spec.kind(), SandboxOp::Create)?;
        self.create_locked(&mut inner, spec)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record(kind, SandboxOp::Delete)?;
        self.delete_locked(&mut inner, kind, id)
    }

    async fn tag(&self, kind: ResourceKind, id: &str, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record(kind, SandboxOp::Tag)?;
        let entry = inner.entry_mut(kind, id)?;
        entry.resource.tags.insert(key.to_string(), value.to_string());
        if key == NAME_TAG {
            entry.resource.name = Some(value.to_string());
        }
        Ok(())
    }

    async fn perform(&self, action: &ResourceAction) -> Result<()> {
        let mut inner = self.lock();
        inner.record(action_kind(action), SandboxOp::Perform)?;
        self.perform_locked(&mut inner, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::InstanceConfig;

    async fn vpc_with_subnet(cloud: &SandboxCloud) -> (String, String) {
        let vpc = cloud
            .create(&ResourceSpec::new("net", ResourceConfig::Vpc { cidr: "10.0.0.0/16".into() }))
            .await
            .unwrap();
        let subnet = cloud
            .create(&ResourceSpec::new(
                "private",
                ResourceConfig::Subnet {
                    vpc_id: vpc.clone(),
                    cidr: "10.0.1.0/24".into(),
                    availability_zone: "us-east-1a".into(),
                },
            ))
            .await
            .unwrap();
        (vpc, subnet)
    }

    #[tokio::test]
    async fn test_vpc_comes_with_main_route_table() {
        let cloud = SandboxCloud::new();
        let (vpc, _) = vpc_with_subnet(&cloud).await;

        let main = cloud.describe(&Query::main_route_table(&vpc)).await.unwrap();
        assert_eq!(main.len(), 1);
        assert!(main[0].is_main);
    }

    #[tokio::test]
    async fn test_convergence_takes_describes() {
        let cloud = SandboxCloud::new().with_convergence(2);
        let (_, subnet) = vpc_with_subnet(&cloud).await;
        let id = cloud
            .create(&ResourceSpec::new(
                "web",
                ResourceConfig::Instance(InstanceConfig {
                    instance_type: "t3.small".into(),
                    image_id: "ami-1".into(),
                    subnet_id: subnet,
                    security_group_id: "sg-1".into(),
                    private_ip: "10.0.1.10".into(),
                    key_name: "root".into(),
                }),
            ))
            .await
            .unwrap();

        let query = Query::by_id(ResourceKind::Instance, &id);
        assert_eq!(cloud.describe(&query).await.unwrap()[0].state, ResourceState::Pending);
        assert_eq!(cloud.describe(&query).await.unwrap()[0].state, ResourceState::Running);
    }

    #[tokio::test]
    async fn test_vpc_delete_with_dependencies_is_conflict() {
        let cloud = SandboxCloud::new();
        let (vpc, subnet) = vpc_with_subnet(&cloud).await;

        let err = cloud.delete(ResourceKind::Vpc, &vpc).await.unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));

        cloud.delete(ResourceKind::Subnet, &subnet).await.unwrap();
        cloud.delete(ResourceKind::Vpc, &vpc).await.unwrap();
        assert!(cloud.resources(ResourceKind::RouteTable).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rule_is_already_exists() {
        let cloud = SandboxCloud::new();
        let (vpc, _) = vpc_with_subnet(&cloud).await;
        let group = cloud
            .create(&ResourceSpec::new(
                "web",
                ResourceConfig::SecurityGroup {
                    vpc_id: vpc,
                    description: "web".into(),
                },
            ))
            .await
            .unwrap();
        let action = ResourceAction::AuthorizeRule {
            group_id: group,
            rule: crate::spec::SecurityRule {
                protocol: "tcp".into(),
                port: 22,
                cidr: "0.0.0.0/0".into(),
                direction: crate::spec::TrafficDirection::Ingress,
            },
        };

        cloud.perform(&action).await.unwrap();
        assert!(cloud.perform(&action).await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_terminated_instance_releases_address() {
        let cloud = SandboxCloud::new();
        let (_, subnet) = vpc_with_subnet(&cloud).await;
        let address = cloud
            .create(&ResourceSpec::new("bastion_ip", ResourceConfig::FloatingIp))
            .await
            .unwrap();
        let instance = cloud
            .create(&ResourceSpec::new(
                "bastion",
                ResourceConfig::Instance(InstanceConfig {
                    instance_type: "t3.small".into(),
                    image_id: "ami-1".into(),
                    subnet_id: subnet,
                    security_group_id: "sg-1".into(),
                    private_ip: "10.0.1.10".into(),
                    key_name: "root".into(),
                }),
            ))
            .await
            .unwrap();
        cloud
            .perform(&ResourceAction::AssociateAddress {
                allocation_id: address.clone(),
                instance_id: instance.clone(),
            })
            .await
            .unwrap();
        assert!(cloud.delete(ResourceKind::FloatingIp, &address).await.is_err());

        cloud.delete(ResourceKind::Instance, &instance).await.unwrap();
        let found = cloud
            .describe(&Query::by_id(ResourceKind::FloatingIp, &address))
            .await
            .unwrap();
        assert!(found[0].active_attachment().is_none());
        cloud.delete(ResourceKind::FloatingIp, &address).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_on_injects_api_error() {
        let cloud = SandboxCloud::new();
        cloud.fail_on(ResourceKind::Vpc, SandboxOp::Create);

        let err = cloud
            .create(&ResourceSpec::new("net", ResourceConfig::Vpc { cidr: "10.0.0.0/16".into() }))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Api(_)));
        assert_eq!(cloud.create_calls(ResourceKind::Vpc), 1);
    }

    #[tokio::test]
    async fn test_instance_profile_association_is_single() {
        let cloud = SandboxCloud::new();
        cloud.insert(
            ObservedResource::new(ResourceKind::Instance, "i-1").with_state(ResourceState::Running),
        );
        let associate = |profile: &str| ResourceAction::AssociateInstanceProfile {
            instance_id: "i-1".into(),
            profile_name: profile.into(),
        };

        cloud.perform(&associate("reader")).await.unwrap();
        let again = cloud.perform(&associate("reader")).await.unwrap_err();
        let other = cloud.perform(&associate("writer")).await.unwrap_err();

        assert!(again.is_already_exists());
        assert!(matches!(other, CloudError::Conflict(_)));
        assert_eq!(cloud.instance_profile("i-1").as_deref(), Some("reader"));
        let found = cloud
            .describe(&Query::by_id(ResourceKind::Instance, "i-1"))
            .await
            .unwrap();
        assert_eq!(found[0].instance_profile.as_deref(), Some("reader"));
    }
}
