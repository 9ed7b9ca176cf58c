//! [`CloudClient`] over the EC2 API

use crate::convert;
use crate::error::{AwsError, OperationResult};
use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::types::{
    DomainType, Filter, IamInstanceProfileSpecification, InstanceType, IpPermission, IpRange,
    ResourceType, Tag, TagSpecification, VolumeType,
};
use skyfleet_cloud::{
    CloudClient, NAME_TAG, ObservedResource, Query, ResourceAction, ResourceConfig, ResourceKind,
    ResourceSpec, Result, RouteTarget, SecurityRule, TrafficDirection,
};
use tracing::debug;

/// Resource type used in tag specifications
fn tag_resource_type(kind: ResourceKind) -> ResourceType {
    ResourceType::from(match kind {
        ResourceKind::Vpc => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::SecurityGroup => "security-group",
        ResourceKind::InternetGateway => "internet-gateway",
        ResourceKind::NatGateway => "natgateway",
        ResourceKind::RouteTable => "route-table",
        ResourceKind::FloatingIp => "elastic-ip",
        ResourceKind::Volume => "volume",
        ResourceKind::Instance => "instance",
        ResourceKind::Image => "image",
        ResourceKind::Snapshot => "snapshot",
        ResourceKind::KeyPair => "key-pair",
        ResourceKind::InstanceType => "instance-type",
    })
}

fn filter(name: impl Into<String>, value: impl Into<String>) -> Filter {
    Filter::builder().name(name).values(value).build()
}

/// Server-side filters for a describe call
///
/// Key pairs and instance types are looked up by their provider-side name,
/// which goes in the request itself rather than in a filter.
fn describe_filters(query: &Query) -> Vec<Filter> {
    let mut filters = Vec::new();
    if !matches!(query.kind, ResourceKind::KeyPair | ResourceKind::InstanceType) {
        if let Some(name) = &query.name {
            filters.push(filter(format!("tag:{}", NAME_TAG), name));
        }
        for (key, value) in &query.tags {
            filters.push(filter(format!("tag:{}", key), value));
        }
    }
    if let Some(parent) = &query.parent_id {
        let field = match query.kind {
            ResourceKind::NatGateway | ResourceKind::Instance => "subnet-id",
            _ => "vpc-id",
        };
        filters.push(filter(field, parent));
    }
    if query.main_only {
        filters.push(filter("association.main", "true"));
    }
    filters
}

fn optional(filters: Vec<Filter>) -> Option<Vec<Filter>> {
    (!filters.is_empty()).then_some(filters)
}

/// Tag specification for a new resource, `Name` included
fn tag_specification(spec: &ResourceSpec) -> TagSpecification {
    let mut tags: Vec<Tag> = spec
        .tags
        .iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect();
    if !spec.tags.contains_key(NAME_TAG) {
        tags.push(Tag::builder().key(NAME_TAG).value(&spec.name).build());
    }
    TagSpecification::builder()
        .resource_type(tag_resource_type(spec.kind()))
        .set_tags(Some(tags))
        .build()
}

fn ip_permission(rule: &SecurityRule) -> IpPermission {
    let range = IpRange::builder().cidr_ip(&rule.cidr).build();
    let permission = IpPermission::builder().ip_ranges(range);
    match rule.protocol.as_str() {
        "all" | "-1" => permission.ip_protocol("-1"),
        "icmp" if rule.port == 0 => permission.ip_protocol("icmp").from_port(-1).to_port(-1),
        protocol => permission
            .ip_protocol(protocol)
            .from_port(i32::from(rule.port))
            .to_port(i32::from(rule.port)),
    }
    .build()
}

fn missing_id(operation: &'static str) -> AwsError {
    AwsError::UnexpectedResponse(format!("{} returned no resource id", operation))
}

/// AWS cloud client
pub struct AwsClient {
    ec2: Client,
}

impl AwsClient {
    pub fn new(ec2: Client) -> Self {
        Self { ec2 }
    }

    /// Client from the standard AWS configuration chain
    ///
    /// Credentials and region come from the environment, `~/.aws/config` or
    /// instance metadata; `region` overrides the configured region.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }

    async fn describe_raw(&self, query: &Query) -> crate::Result<Vec<ObservedResource>> {
        let filters = optional(describe_filters(query));
        let ids = query.id.clone().map(|id| vec![id]);

        let found = match query.kind {
            ResourceKind::Vpc => self
                .ec2
                .describe_vpcs()
                .set_vpc_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeVpcs")?
                .vpcs()
                .iter()
                .map(convert::vpc)
                .collect(),
            ResourceKind::Subnet => self
                .ec2
                .describe_subnets()
                .set_subnet_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeSubnets")?
                .subnets()
                .iter()
                .map(convert::subnet)
                .collect(),
            ResourceKind::SecurityGroup => self
                .ec2
                .describe_security_groups()
                .set_group_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeSecurityGroups")?
                .security_groups()
                .iter()
                .map(convert::security_group)
                .collect(),
            ResourceKind::InternetGateway => self
                .ec2
                .describe_internet_gateways()
                .set_internet_gateway_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeInternetGateways")?
                .internet_gateways()
                .iter()
                .map(convert::internet_gateway)
                .collect(),
            // The NAT gateway call spells its filter list in the singular
            ResourceKind::NatGateway => self
                .ec2
                .describe_nat_gateways()
                .set_nat_gateway_ids(ids)
                .set_filter(filters)
                .send()
                .await
                .during("DescribeNatGateways")?
                .nat_gateways()
                .iter()
                .map(convert::nat_gateway)
                .collect(),
            ResourceKind::RouteTable => self
                .ec2
                .describe_route_tables()
                .set_route_table_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeRouteTables")?
                .route_tables()
                .iter()
                .map(convert::route_table)
                .collect(),
            ResourceKind::FloatingIp => self
                .ec2
                .describe_addresses()
                .set_allocation_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeAddresses")?
                .addresses()
                .iter()
                .map(convert::address)
                .collect(),
            ResourceKind::Volume => self
                .ec2
                .describe_volumes()
                .set_volume_ids(ids)
                .set_filters(filters)
                .send()
                .await
                .during("DescribeVolumes")?
                .volumes()
                .iter()
                .map(convert::volume)
                .collect(),
            ResourceKind::Instance => {
                let mut pages = self
                    .ec2
                    .describe_instances()
                    .set_instance_ids(ids)
                    .set_filters(filters)
                    .into_paginator()
                    .send();
                let mut found = Vec::new();
                while let Some(page) = pages.next().await {
                    let page = page.during("DescribeInstances")?;
                    found.extend(
                        page.reservations()
                            .iter()
                            .flat_map(|r| r.instances())
                            .map(convert::instance),
                    );
                }
                found
            }
            // Without an id, only our own images and snapshots, not every public one
            ResourceKind::Image => {
                let owners = ids.is_none().then(|| vec!["self".to_string()]);
                self.ec2
                    .describe_images()
                    .set_image_ids(ids)
                    .set_owners(owners)
                    .set_filters(filters)
                    .send()
                    .await
                    .during("DescribeImages")?
                    .images()
                    .iter()
                    .map(convert::image)
                    .collect()
            }
            ResourceKind::Snapshot => {
                let owners = ids.is_none().then(|| vec!["self".to_string()]);
                self.ec2
                    .describe_snapshots()
                    .set_snapshot_ids(ids)
                    .set_owner_ids(owners)
                    .set_filters(filters)
                    .send()
                    .await
                    .during("DescribeSnapshots")?
                    .snapshots()
                    .iter()
                    .map(convert::snapshot)
                    .collect()
            }
            ResourceKind::KeyPair => self
                .ec2
                .describe_key_pairs()
                .set_key_pair_ids(ids)
                .set_key_names(query.name.clone().map(|name| vec![name]))
                .set_filters(filters)
                .send()
                .await
                .during("DescribeKeyPairs")?
                .key_pairs()
                .iter()
                .map(convert::key_pair)
                .collect(),
            ResourceKind::InstanceType => {
                let name = query.name.as_ref().or(query.id.as_ref());
                self.ec2
                    .describe_instance_types()
                    .set_instance_types(name.map(|n| vec![InstanceType::from(n.as_str())]))
                    .send()
                    .await
                    .during("DescribeInstanceTypes")?
                    .instance_types()
                    .iter()
                    .map(convert::instance_type)
                    .collect()
            }
        };
        Ok(found)
    }

    async fn create_raw(&self, spec: &ResourceSpec) -> crate::Result<String> {
        let tags = tag_specification(spec);
        let id = match &spec.config {
            ResourceConfig::Vpc { cidr } => self
                .ec2
                .create_vpc()
                .cidr_block(cidr)
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateVpc")?
                .vpc()
                .and_then(|v| v.vpc_id())
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateVpc"))?,
            ResourceConfig::Subnet {
                vpc_id,
                cidr,
                availability_zone,
            } => self
                .ec2
                .create_subnet()
                .vpc_id(vpc_id)
                .cidr_block(cidr)
                .availability_zone(availability_zone)
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateSubnet")?
                .subnet()
                .and_then(|s| s.subnet_id())
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateSubnet"))?,
            ResourceConfig::SecurityGroup {
                vpc_id,
                description,
            } => self
                .ec2
                .create_security_group()
                .group_name(&spec.name)
                .description(description)
                .vpc_id(vpc_id)
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateSecurityGroup")?
                .group_id()
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateSecurityGroup"))?,
            ResourceConfig::InternetGateway => self
                .ec2
                .create_internet_gateway()
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateInternetGateway")?
                .internet_gateway()
                .and_then(|g| g.internet_gateway_id())
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateInternetGateway"))?,
            ResourceConfig::NatGateway {
                subnet_id,
                allocation_id,
            } => self
                .ec2
                .create_nat_gateway()
                .subnet_id(subnet_id)
                .allocation_id(allocation_id)
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateNatGateway")?
                .nat_gateway()
                .and_then(|n| n.nat_gateway_id())
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateNatGateway"))?,
            ResourceConfig::RouteTable { vpc_id } => self
                .ec2
                .create_route_table()
                .vpc_id(vpc_id)
                .tag_specifications(tags)
                .send()
                .await
                .during("CreateRouteTable")?
                .route_table()
                .and_then(|t| t.route_table_id())
                .map(str::to_string)
                .ok_or_else(|| missing_id("CreateRouteTable"))?,
            ResourceConfig::FloatingIp => self
                .ec2
                .allocate_address()
                .domain(DomainType::Vpc)
                .tag_specifications(tags)
                .send()
                .await
                .during("AllocateAddress")?
                .allocation_id()
                .map(str::to_string)
                .ok_or_else(|| missing_id("AllocateAddress"))?,
            ResourceConfig::Volume {
                availability_zone,
                size_gb,
                volume_type,
            } => {
                let size = i32::try_from(*size_gb).map_err(|_| {
                    AwsError::Unsupported(format!("volume size {} GiB is out of range", size_gb))
                })?;
                self.ec2
                    .create_volume()
                    .availability_zone(availability_zone)
                    .size(size)
                    .volume_type(VolumeType::from(volume_type.as_str()))
                    .tag_specifications(tags)
                    .send()
                    .await
                    .during("CreateVolume")?
                    .volume_id()
                    .map(str::to_string)
                    .ok_or_else(|| missing_id("CreateVolume"))?
            }
            ResourceConfig::Instance(config) => {
                let key_name = (!config.key_name.is_empty()).then(|| config.key_name.clone());
                self.ec2
                    .run_instances()
                    .image_id(&config.image_id)
                    .instance_type(InstanceType::from(config.instance_type.as_str()))
                    .subnet_id(&config.subnet_id)
                    .security_group_ids(&config.security_group_id)
                    .private_ip_address(&config.private_ip)
                    .set_key_name(key_name)
                    .min_count(1)
                    .max_count(1)
                    .tag_specifications(tags)
                    .send()
                    .await
                    .during("RunInstances")?
                    .instances()
                    .first()
                    .and_then(|i| i.instance_id())
                    .map(str::to_string)
                    .ok_or_else(|| missing_id("RunInstances"))?
            }
            // The snapshots behind the image are tagged too, so they show up in listings
            ResourceConfig::Image { instance_id } => {
                let snapshot_tags = TagSpecification::builder()
                    .resource_type(ResourceType::Snapshot)
                    .set_tags(Some(tags.tags().to_vec()))
                    .build();
                self.ec2
                    .create_image()
                    .instance_id(instance_id)
                    .name(&spec.name)
                    .tag_specifications(tags)
                    .tag_specifications(snapshot_tags)
                    .send()
                    .await
                    .during("CreateImage")?
                    .image_id()
                    .map(str::to_string)
                    .ok_or_else(|| missing_id("CreateImage"))?
            }
        };
        Ok(id)
    }

    async fn delete_raw(&self, kind: ResourceKind, id: &str) -> crate::Result<()> {
        match kind {
            ResourceKind::Vpc => {
                self.ec2.delete_vpc().vpc_id(id).send().await.during("DeleteVpc")?;
            }
            ResourceKind::Subnet => {
                self.ec2
                    .delete_subnet()
                    .subnet_id(id)
                    .send()
                    .await
                    .during("DeleteSubnet")?;
            }
            ResourceKind::SecurityGroup => {
                self.ec2
                    .delete_security_group()
                    .group_id(id)
                    .send()
                    .await
                    .during("DeleteSecurityGroup")?;
            }
            ResourceKind::InternetGateway => {
                self.ec2
                    .delete_internet_gateway()
                    .internet_gateway_id(id)
                    .send()
                    .await
                    .during("DeleteInternetGateway")?;
            }
            ResourceKind::NatGateway => {
                self.ec2
                    .delete_nat_gateway()
                    .nat_gateway_id(id)
                    .send()
                    .await
                    .during("DeleteNatGateway")?;
            }
            ResourceKind::RouteTable => {
                self.ec2
                    .delete_route_table()
                    .route_table_id(id)
                    .send()
                    .await
                    .during("DeleteRouteTable")?;
            }
            ResourceKind::FloatingIp => {
                self.ec2
                    .release_address()
                    .allocation_id(id)
                    .send()
                    .await
                    .during("ReleaseAddress")?;
            }
            ResourceKind::Volume => {
                self.ec2
                    .delete_volume()
                    .volume_id(id)
                    .send()
                    .await
                    .during("DeleteVolume")?;
            }
            ResourceKind::Instance => {
                self.ec2
                    .terminate_instances()
                    .instance_ids(id)
                    .send()
                    .await
                    .during("TerminateInstances")?;
            }
            ResourceKind::Image => {
                self.ec2
                    .deregister_image()
                    .image_id(id)
                    .send()
                    .await
                    .during("DeregisterImage")?;
            }
            ResourceKind::Snapshot => {
                self.ec2
                    .delete_snapshot()
                    .snapshot_id(id)
                    .send()
                    .await
                    .during("DeleteSnapshot")?;
            }
            ResourceKind::KeyPair | ResourceKind::InstanceType => {
                return Err(AwsError::Unsupported(format!("{} cannot be deleted", kind)));
            }
        }
        Ok(())
    }

    async fn perform_raw(&self, action: &ResourceAction) -> crate::Result<()> {
        match action {
            ResourceAction::AttachVolume {
                volume_id,
                instance_id,
                device,
            } => {
                self.ec2
                    .attach_volume()
                    .volume_id(volume_id)
                    .instance_id(instance_id)
                    .device(device)
                    .send()
                    .await
                    .during("AttachVolume")?;
            }
            ResourceAction::DetachVolume {
                volume_id,
                instance_id,
                device,
            } => {
                self.ec2
                    .detach_volume()
                    .volume_id(volume_id)
                    .instance_id(instance_id)
                    .set_device((!device.is_empty()).then(|| device.clone()))
                    .send()
                    .await
                    .during("DetachVolume")?;
            }
            ResourceAction::AssociateAddress {
                allocation_id,
                instance_id,
            } => {
                self.ec2
                    .associate_address()
                    .allocation_id(allocation_id)
                    .instance_id(instance_id)
                    .send()
                    .await
                    .during("AssociateAddress")?;
            }
            ResourceAction::AttachInternetGateway { gateway_id, vpc_id } => {
                self.ec2
                    .attach_internet_gateway()
                    .internet_gateway_id(gateway_id)
                    .vpc_id(vpc_id)
                    .send()
                    .await
                    .during("AttachInternetGateway")?;
            }
            ResourceAction::DetachInternetGateway { gateway_id, vpc_id } => {
                self.ec2
                    .detach_internet_gateway()
                    .internet_gateway_id(gateway_id)
                    .vpc_id(vpc_id)
                    .send()
                    .await
                    .during("DetachInternetGateway")?;
            }
            ResourceAction::AssociateRouteTable {
                route_table_id,
                subnet_id,
            } => {
                self.ec2
                    .associate_route_table()
                    .route_table_id(route_table_id)
                    .subnet_id(subnet_id)
                    .send()
                    .await
                    .during("AssociateRouteTable")?;
            }
            ResourceAction::CreateRoute {
                route_table_id,
                destination_cidr,
                target,
            } => {
                let request = self
                    .ec2
                    .create_route()
                    .route_table_id(route_table_id)
                    .destination_cidr_block(destination_cidr);
                let request = match target {
                    RouteTarget::InternetGateway(id) => request.gateway_id(id),
                    RouteTarget::NatGateway(id) => request.nat_gateway_id(id),
                };
                request.send().await.during("CreateRoute")?;
            }
            ResourceAction::AuthorizeRule { group_id, rule } => match rule.direction {
                TrafficDirection::Ingress => {
                    self.ec2
                        .authorize_security_group_ingress()
                        .group_id(group_id)
                        .ip_permissions(ip_permission(rule))
                        .send()
                        .await
                        .during("AuthorizeSecurityGroupIngress")?;
                }
                TrafficDirection::Egress => {
                    self.ec2
                        .authorize_security_group_egress()
                        .group_id(group_id)
                        .ip_permissions(ip_permission(rule))
                        .send()
                        .await
                        .during("AuthorizeSecurityGroupEgress")?;
                }
            },
            ResourceAction::StopInstance { instance_id } => {
                self.ec2
                    .stop_instances()
                    .instance_ids(instance_id)
                    .send()
                    .await
                    .during("StopInstances")?;
            }
            ResourceAction::AssociateInstanceProfile {
                instance_id,
                profile_name,
            } => {
                self.ec2
                    .associate_iam_instance_profile()
                    .instance_id(instance_id)
                    .iam_instance_profile(
                        IamInstanceProfileSpecification::builder()
                            .name(profile_name)
                            .build(),
                    )
                    .send()
                    .await
                    .during("AssociateIamInstanceProfile")?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CloudClient for AwsClient {
    fn name(&self) -> &str {
        "aws"
    }

    async fn describe(&self, query: &Query) -> Result<Vec<ObservedResource>> {
        match self.describe_raw(query).await {
            Ok(found) => Ok(found.into_iter().filter(|r| query.matches(r)).collect()),
            // Describing a missing id or key name fails instead of returning nothing
            Err(e) if e.is_not_found() => {
                debug!("{} {:?}: nothing found", query.kind, query.id);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<String> {
        let id = self.create_raw(spec).await?;
        debug!("created {} {}: {}", spec.kind(), spec.name, id);
        Ok(id)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.delete_raw(kind, id).await?;
        Ok(())
    }

    async fn tag(&self, kind: ResourceKind, id: &str, key: &str, value: &str) -> Result<()> {
        debug!("tagging {} {} with {}={}", kind, id, key, value);
        self.ec2
            .create_tags()
            .resources(id)
            .tags(Tag::builder().key(key).value(value).build())
            .send()
            .await
            .during("CreateTags")?;
        Ok(())
    }

    async fn perform(&self, action: &ResourceAction) -> Result<()> {
        self.perform_raw(action).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfleet_cloud::InstanceConfig;

    fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|f| {
                (
                    f.name().unwrap_or_default().to_string(),
                    f.values().join(","),
                )
            })
            .collect()
    }

    #[test]
    fn test_describe_by_name_and_deployment() {
        let query = Query::by_name(ResourceKind::Subnet, "sample_public")
            .with_tag("DeploymentName", "sample");

        assert_eq!(
            filter_pairs(&describe_filters(&query)),
            vec![
                ("tag:Name".to_string(), "sample_public".to_string()),
                ("tag:DeploymentName".to_string(), "sample".to_string()),
            ]
        );
    }

    #[test]
    fn test_key_pair_name_is_not_a_tag_filter() {
        let query = Query::by_name(ResourceKind::KeyPair, "sample-root");
        assert!(describe_filters(&query).is_empty());
        assert!(optional(describe_filters(&query)).is_none());
    }

    #[test]
    fn test_main_route_table_filters() {
        let pairs = filter_pairs(&describe_filters(&Query::main_route_table("vpc-1")));
        assert_eq!(
            pairs,
            vec![
                ("vpc-id".to_string(), "vpc-1".to_string()),
                ("association.main".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_instances_filter_on_subnet() {
        let query = Query::new(ResourceKind::Instance).with_parent("subnet-7");
        assert_eq!(
            filter_pairs(&describe_filters(&query)),
            vec![("subnet-id".to_string(), "subnet-7".to_string())]
        );
    }

    #[test]
    fn test_tag_specification_adds_name() {
        let spec = ResourceSpec::new(
            "sample-bastion",
            ResourceConfig::Instance(InstanceConfig {
                instance_type: "t2.micro".into(),
                image_id: "ami-0001".into(),
                subnet_id: "subnet-1".into(),
                security_group_id: "sg-1".into(),
                private_ip: "10.5.1.10".into(),
                key_name: String::new(),
            }),
        )
        .with_tag("DeploymentName", "sample");

        let tags = tag_specification(&spec);
        assert_eq!(tags.resource_type(), Some(&ResourceType::Instance));
        let keys: Vec<&str> = tags.tags().iter().filter_map(|t| t.key()).collect();
        assert_eq!(keys, vec!["DeploymentName", "Name"]);
        assert_eq!(tags.tags()[1].value(), Some("sample-bastion"));
    }

    #[test]
    fn test_nat_gateway_tag_resource_type() {
        assert_eq!(
            tag_resource_type(ResourceKind::NatGateway).as_str(),
            "natgateway"
        );
        assert_eq!(
            tag_resource_type(ResourceKind::FloatingIp),
            ResourceType::ElasticIp
        );
    }

    #[test]
    fn test_rule_permissions() {
        let all = SecurityRule {
            protocol: "all".into(),
            port: 0,
            cidr: "10.5.0.0/16".into(),
            direction: TrafficDirection::Ingress,
        };
        let permission = ip_permission(&all);
        assert_eq!(permission.ip_protocol(), Some("-1"));
        assert_eq!(permission.from_port(), None);

        let ping = SecurityRule {
            protocol: "icmp".into(),
            ..all.clone()
        };
        let permission = ip_permission(&ping);
        assert_eq!((permission.from_port(), permission.to_port()), (Some(-1), Some(-1)));

        let ssh = SecurityRule {
            protocol: "tcp".into(),
            port: 22,
            ..all
        };
        let permission = ip_permission(&ssh);
        assert_eq!(permission.from_port(), Some(22));
        assert_eq!(permission.ip_ranges()[0].cidr_ip(), Some("10.5.0.0/16"));
    }

    #[test]
    fn test_missing_id_is_unexpected_response() {
        let e = missing_id("CreateVpc");
        assert!(matches!(e, AwsError::UnexpectedResponse(ref m) if m.contains("CreateVpc")));
    }
}
