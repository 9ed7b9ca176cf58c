//! EC2 SDK types to observed resources
//!
//! Only the fields skyfleet reads are carried over.

use aws_sdk_ec2::types::{
    Address, Image, Instance, InstanceTypeInfo, InternetGateway, KeyPairInfo, NatGateway,
    RouteTable, SecurityGroup, Snapshot, Subnet, Tag, Volume, Vpc,
};
use skyfleet_cloud::{
    Attachment, AttachmentState, NAME_TAG, ObservedResource, ResourceKind, ResourceState,
};

fn state(value: Option<&str>) -> ResourceState {
    value.map_or(ResourceState::Unknown, ResourceState::from_provider)
}

/// Common tail of every tagged resource
fn observed(kind: ResourceKind, id: Option<&str>, state: ResourceState, tags: &[Tag]) -> ObservedResource {
    let mut resource = ObservedResource::new(kind, id.unwrap_or_default()).with_state(state);
    for tag in tags {
        let (Some(key), Some(value)) = (tag.key(), tag.value()) else {
            continue;
        };
        if key == NAME_TAG {
            resource.name = Some(value.to_string());
        }
        resource.tags.insert(key.to_string(), value.to_string());
    }
    resource
}

pub fn vpc(v: &Vpc) -> ObservedResource {
    observed(
        ResourceKind::Vpc,
        v.vpc_id(),
        state(v.state().map(|s| s.as_str())),
        v.tags(),
    )
}

pub fn subnet(s: &Subnet) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::Subnet,
        s.subnet_id(),
        state(s.state().map(|s| s.as_str())),
        s.tags(),
    );
    resource.parent_id = s.vpc_id().map(str::to_string);
    resource
}

pub fn security_group(g: &SecurityGroup) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::SecurityGroup,
        g.group_id(),
        ResourceState::Available,
        g.tags(),
    );
    resource.parent_id = g.vpc_id().map(str::to_string);
    resource
}

pub fn internet_gateway(g: &InternetGateway) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::InternetGateway,
        g.internet_gateway_id(),
        ResourceState::Available,
        g.tags(),
    );
    resource.attachments = g
        .attachments()
        .iter()
        .filter_map(|a| {
            let state = a.state().map_or("", |s| s.as_str());
            Some(Attachment::new(a.vpc_id()?, AttachmentState::from_provider(state)))
        })
        .collect();
    resource
}

pub fn nat_gateway(n: &NatGateway) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::NatGateway,
        n.nat_gateway_id(),
        state(n.state().map(|s| s.as_str())),
        n.tags(),
    );
    resource.parent_id = n.subnet_id().map(str::to_string);
    resource
}

pub fn route_table(t: &RouteTable) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::RouteTable,
        t.route_table_id(),
        ResourceState::Available,
        t.tags(),
    );
    resource.parent_id = t.vpc_id().map(str::to_string);
    resource.is_main = t.associations().iter().any(|a| a.main() == Some(true));
    resource.attachments = t
        .associations()
        .iter()
        .filter_map(|a| a.subnet_id())
        .map(|subnet| Attachment::new(subnet, AttachmentState::Attached))
        .collect();
    resource
}

pub fn address(a: &Address) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::FloatingIp,
        a.allocation_id(),
        ResourceState::Available,
        a.tags(),
    );
    resource.address = a.public_ip().map(str::to_string);
    if let Some(instance_id) = a.instance_id().filter(|id| !id.is_empty()) {
        resource
            .attachments
            .push(Attachment::new(instance_id, AttachmentState::Attached));
    }
    resource
}

pub fn volume(v: &Volume) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::Volume,
        v.volume_id(),
        state(v.state().map(|s| s.as_str())),
        v.tags(),
    );
    resource.attachments = v
        .attachments()
        .iter()
        .filter_map(|a| {
            let state = a.state().map_or("", |s| s.as_str());
            let attachment =
                Attachment::new(a.instance_id()?, AttachmentState::from_provider(state));
            Some(match a.device() {
                Some(device) => attachment.with_device(device),
                None => attachment,
            })
        })
        .collect();
    resource
}

pub fn instance(i: &Instance) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::Instance,
        i.instance_id(),
        state(i.state().and_then(|s| s.name()).map(|n| n.as_str())),
        i.tags(),
    );
    resource.parent_id = i.subnet_id().map(str::to_string);
    // arn:aws:iam::<account>:instance-profile/<path>/<name>
    resource.instance_profile = i
        .iam_instance_profile()
        .and_then(|p| p.arn())
        .and_then(|arn| arn.rsplit('/').next())
        .map(str::to_string);
    resource
}

pub fn image(i: &Image) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::Image,
        i.image_id(),
        state(i.state().map(|s| s.as_str())),
        i.tags(),
    );
    resource.snapshot_ids = i
        .block_device_mappings()
        .iter()
        .filter_map(|m| m.ebs().and_then(|ebs| ebs.snapshot_id()))
        .map(str::to_string)
        .collect();
    resource
}

pub fn snapshot(s: &Snapshot) -> ObservedResource {
    observed(
        ResourceKind::Snapshot,
        s.snapshot_id(),
        state(s.state().map(|s| s.as_str())),
        s.tags(),
    )
}

/// Key pairs are named by key name, not by tag
pub fn key_pair(k: &KeyPairInfo) -> ObservedResource {
    let mut resource = observed(
        ResourceKind::KeyPair,
        k.key_pair_id(),
        ResourceState::Available,
        k.tags(),
    );
    resource.name = k.key_name().map(str::to_string);
    resource
}

pub fn instance_type(t: &InstanceTypeInfo) -> ObservedResource {
    let name = t.instance_type().map(|t| t.as_str()).unwrap_or_default();
    let mut resource = ObservedResource::new(ResourceKind::InstanceType, name)
        .with_state(ResourceState::Available);
    resource.name = Some(name.to_string());
    resource
}
