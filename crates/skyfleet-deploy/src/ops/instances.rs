//! Compute instances

use super::{find_present, perform_once};
use crate::context::{TaskContext, secs};
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{
    InstanceConfig, Presence, ResourceAction, ResourceConfig, ResourceKind, ResourceSpec,
    ResourceState,
};
use skyfleet_core::InstanceDef;

pub async fn create(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    let def = ctx.instance(nickname)?;
    create_with_image(ctx, log, def, &def.image_id).await
}

/// Same as [`create`], booting from the snapshot image named after the host
pub async fn create_from_snapshot(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    nickname: &str,
) -> Result<()> {
    let def = ctx.instance(nickname)?;
    let image = ctx
        .reconciler
        .find(ResourceKind::Image, &def.inst_name)
        .await?
        .filter(|image| image.presence() != Presence::Absent)
        .ok_or_else(|| DeployError::Missing {
            what: format!("snapshot image {}", def.inst_name),
            hint: "create_snapshot_images",
        })?;

    if image.state != ResourceState::Available {
        return Err(DeployError::Conflict(format!(
            "cannot create instance {} from snapshot image {} in state {}",
            nickname, image.id, image.state
        )));
    }
    if image.snapshot_ids.is_empty() {
        return Err(DeployError::Conflict(format!(
            "snapshot image {} of {} has no snapshots",
            image.id, nickname
        )));
    }
    log.add(format!(
        "using snapshot image {} ({})",
        image.id,
        image.snapshot_ids.join(",")
    ));

    create_with_image(ctx, log, def, &image.id).await
}

async fn create_with_image(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    def: &InstanceDef,
    image_id: &str,
) -> Result<()> {
    let subnet = find_present(ctx, ResourceKind::Subnet, &def.subnet_name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!("subnet {} of instance {}", def.subnet_name, def.inst_name),
            hint: "create_networking",
        })?;
    let group = find_present(ctx, ResourceKind::SecurityGroup, &def.security_group_name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!(
                "security group {} of instance {}",
                def.security_group_name, def.inst_name
            ),
            hint: "create_security_groups",
        })?;

    // A floating IP held by some other instance must not be stolen
    let address = match &def.external_ip_address_name {
        Some(ip_name) => {
            let address = ctx
                .reconciler
                .find_live(ResourceKind::FloatingIp, ip_name)
                .await
                .map_err(DeployError::missing(
                    format!("floating ip {}", ip_name),
                    "create_floating_ips",
                ))?;
            let existing = find_present(ctx, ResourceKind::Instance, &def.inst_name).await?;
            if let Some(holder) = address.active_attachment() {
                let ours = existing.as_ref().is_some_and(|i| i.id == holder.target_id);
                if !ours {
                    return Err(DeployError::Conflict(format!(
                        "cannot create instance {}, floating ip {} is already assigned to instance {}",
                        def.inst_name, ip_name, holder.target_id
                    )));
                }
            }
            Some(address)
        }
        None => None,
    };

    let spec = ResourceSpec::new(
        &def.inst_name,
        ResourceConfig::Instance(InstanceConfig {
            instance_type: def.flavor.clone(),
            image_id: image_id.to_string(),
            subnet_id: subnet.id,
            security_group_id: group.id,
            private_ip: def.ip_address.clone(),
            key_name: def.root_key_name.clone(),
        }),
    );
    let ensured = ctx
        .reconciler
        .ensure(&spec, secs(ctx.project.timeouts.create_instance))
        .await?;
    log.add(format!(
        "instance {}: {} ({})",
        def.inst_name,
        ensured.id(),
        if ensured.is_created() { "created" } else { "already there" }
    ));

    if let Some(address) = address {
        if address.active_attachment().is_none() {
            perform_once(
                ctx,
                log,
                ResourceAction::AssociateAddress {
                    allocation_id: address.id,
                    instance_id: ensured.id().to_string(),
                },
            )
            .await?;
        }
    }

    if let Some(profile) = &def.associated_instance_profile {
        let current = ctx
            .reconciler
            .describe_by_id(ResourceKind::Instance, ensured.id())
            .await?
            .and_then(|instance| instance.instance_profile);
        match current {
            None => {
                perform_once(
                    ctx,
                    log,
                    ResourceAction::AssociateInstanceProfile {
                        instance_id: ensured.id().to_string(),
                        profile_name: profile.clone(),
                    },
                )
                .await?;
            }
            Some(current) if &current == profile => {
                log.add(format!(
                    "instance profile {} already associated with {}",
                    profile, def.inst_name
                ));
            }
            Some(current) => {
                return Err(DeployError::Conflict(format!(
                    "instance {} has instance profile {}, expected {}",
                    def.inst_name, current, profile
                )));
            }
        }
    }

    Ok(())
}

pub async fn delete(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    let def = ctx.instance(nickname)?;

    if !ctx.options.ignore_attached_volumes {
        let attached = attached_volumes(ctx, def).await?;
        if !attached.is_empty() {
            return Err(DeployError::Conflict(format!(
                "cannot delete instance {}, detach volumes first: {}",
                nickname,
                attached.join(",")
            )));
        }
    }

    super::delete_logged(
        ctx,
        log,
        ResourceKind::Instance,
        &def.inst_name,
        secs(ctx.project.timeouts.delete_instance),
    )
    .await
}

/// Names of this instance's volumes that are attached to something
pub(crate) async fn attached_volumes(ctx: &TaskContext, def: &InstanceDef) -> Result<Vec<String>> {
    let mut attached = Vec::new();
    for volume in def.volumes.values() {
        let found = find_present(ctx, ResourceKind::Volume, &volume.name).await?;
        if found.is_some_and(|v| v.active_attachment().is_some()) {
            attached.push(volume.name.clone());
        }
    }
    Ok(attached)
}
