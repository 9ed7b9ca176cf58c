//! Block volumes: create, attach and mount, unmount and detach, delete

use super::{delete_logged, ensure_logged, find_present};
use crate::context::{TaskContext, secs};
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{AttachmentState, ResourceAction, ResourceConfig, ResourceKind, ResourceSpec};
use skyfleet_core::{InstanceDef, VolumeDef};
use std::collections::BTreeMap;

const INIT_VOLUME_ATTACHMENT: &str = include_str!("../../resources/init_volume_attachment.sh");

fn volume_of<'a>(
    ctx: &'a TaskContext,
    instance: &str,
    volume: &str,
) -> Result<(&'a InstanceDef, &'a VolumeDef)> {
    let def = ctx.instance(instance)?;
    let vol = def.volumes.get(volume).ok_or_else(|| {
        DeployError::Invalid(format!("volume {} is not declared on {}", volume, instance))
    })?;
    Ok((def, vol))
}

/// Device name to request when attaching `volume`
///
/// Nicknames in descending order get `/dev/sdf`, `/dev/sdg` and so on, so
/// the same volume always lands on the same device.
pub fn suggested_device(volumes: &BTreeMap<String, VolumeDef>, volume: &str) -> Option<String> {
    volumes
        .keys()
        .rev()
        .position(|nickname| nickname == volume)
        .and_then(|index| u8::try_from(index).ok())
        .filter(|index| *index < 20)
        .map(|index| format!("/dev/sd{}", char::from(b'f' + index)))
}

/// Name the device gets on Nitro instances
pub fn nitro_device(suggested: &str) -> String {
    match suggested {
        "/dev/sdf" => "/dev/nvme1n1".to_string(),
        "/dev/sdg" => "/dev/nvme2n1".to_string(),
        "/dev/sdh" => "/dev/nvme3n1".to_string(),
        other => other.to_string(),
    }
}

pub async fn create(ctx: &TaskContext, log: &mut LogBuilder, instance: &str, volume: &str) -> Result<()> {
    let (_, vol) = volume_of(ctx, instance, volume)?;
    ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &vol.name,
            ResourceConfig::Volume {
                availability_zone: vol.availability_zone.clone(),
                size_gb: vol.size,
                volume_type: vol.volume_type.clone(),
            },
        ),
        secs(ctx.project.timeouts.create_volume),
    )
    .await?;
    Ok(())
}

pub async fn attach(ctx: &TaskContext, log: &mut LogBuilder, instance: &str, volume: &str) -> Result<()> {
    let (def, vol) = volume_of(ctx, instance, volume)?;

    if vol.mount_point.is_empty() || vol.permissions == 0 || vol.owner.is_empty() {
        return Err(DeployError::Invalid(format!(
            "volume {} needs mount_point ({}), permissions ({}) and owner ({})",
            vol.name, vol.mount_point, vol.permissions, vol.owner
        )));
    }

    let found = find_present(ctx, ResourceKind::Volume, &vol.name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!("volume {}", vol.name),
            hint: "create_volumes",
        })?;

    let device = suggested_device(&def.volumes, volume).ok_or_else(|| {
        DeployError::Invalid(format!("no device name left for volume {}", volume))
    })?;

    let target = find_present(ctx, ResourceKind::Instance, &def.inst_name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!("instance {}", def.inst_name),
            hint: "create_instances",
        })?;

    match found.active_attachment() {
        Some(attachment) if attachment.state != AttachmentState::Attached => {
            return Err(DeployError::Conflict(format!(
                "cannot attach volume {}, it is attached to {} in state {}",
                vol.name, attachment.target_id, attachment.state
            )));
        }
        Some(attachment) if attachment.target_id != target.id => {
            return Err(DeployError::Conflict(format!(
                "cannot attach volume {} to {} ({}), it is attached to instance {}",
                vol.name, def.inst_name, target.id, attachment.target_id
            )));
        }
        Some(attachment) => log.add(format!(
            "volume {} already attached to {} at {}",
            vol.name,
            attachment.target_id,
            attachment.device.as_deref().unwrap_or("?")
        )),
        None => {
            ctx.reconciler
                .client()
                .perform(&ResourceAction::AttachVolume {
                    volume_id: found.id.clone(),
                    instance_id: target.id.clone(),
                    device: device.clone(),
                })
                .await?;
            ctx.reconciler
                .wait_for(
                    ResourceKind::Volume,
                    &found.id,
                    secs(ctx.project.timeouts.attach_volume),
                    |v| {
                        v.active_attachment()
                            .is_some_and(|a| a.state == AttachmentState::Attached)
                    },
                    |v| v.active_attachment().is_none(),
                )
                .await?;
            log.add(format!("attached volume {} to {} at {}", found.id, target.id, device));
        }
    }

    let host = ctx.host_of(def)?;
    let script = format!(
        "{}\ninit_volume_attachment {} {} {} '{}'",
        INIT_VOLUME_ATTACHMENT,
        nitro_device(&device),
        vol.mount_point,
        vol.permissions,
        vol.owner
    );
    let mut result = ctx.shell()?.exec(host, &script).await;
    log.add(result.to_string());
    if let Some(e) = result.error.take() {
        return Err(DeployError::VolumeInit {
            volume: volume.to_string(),
            instance: instance.to_string(),
            message: e.to_string(),
        });
    }

    let block_id = result.last_line();
    if block_id.is_empty() || block_id.starts_with("Error") {
        return Err(DeployError::VolumeInit {
            volume: volume.to_string(),
            instance: instance.to_string(),
            message: format!("returned block device id is '{}'", block_id),
        });
    }
    log.add(format!("mounted {} at {}", block_id, vol.mount_point));
    Ok(())
}

pub async fn detach(ctx: &TaskContext, log: &mut LogBuilder, instance: &str, volume: &str) -> Result<()> {
    let (def, vol) = volume_of(ctx, instance, volume)?;

    let Some(found) = find_present(ctx, ResourceKind::Volume, &vol.name).await? else {
        log.add(format!("volume {} not found, nothing to detach", vol.name));
        return Ok(());
    };
    let Some(attachment) = found.active_attachment().cloned() else {
        log.add(format!("volume {} not attached, nothing to detach", vol.name));
        return Ok(());
    };
    let owner = find_present(ctx, ResourceKind::Instance, &def.inst_name).await?;
    if owner.is_none_or(|i| i.id != attachment.target_id) {
        return Err(DeployError::Conflict(format!(
            "cannot detach volume {} from {}, it is attached to instance {}",
            vol.name, def.inst_name, attachment.target_id
        )));
    }

    let host = ctx.host_of(def)?;
    let mut result = ctx
        .shell()?
        .exec(host, &format!("sudo umount -d {}", vol.mount_point))
        .await;
    log.add(result.to_string());
    if let Some(e) = result.error.take() {
        return Err(DeployError::VolumeInit {
            volume: volume.to_string(),
            instance: instance.to_string(),
            message: format!("umount failed: {}", e),
        });
    }

    ctx.reconciler
        .client()
        .perform(&ResourceAction::DetachVolume {
            volume_id: found.id.clone(),
            instance_id: attachment.target_id.clone(),
            device: attachment.device.clone().unwrap_or_default(),
        })
        .await?;
    ctx.reconciler
        .wait_for(
            ResourceKind::Volume,
            &found.id,
            secs(ctx.project.timeouts.detach_volume),
            |v| v.active_attachment().is_none(),
            |_| false,
        )
        .await?;
    log.add(format!("detached volume {} from {}", found.id, attachment.target_id));
    Ok(())
}

pub async fn delete(ctx: &TaskContext, log: &mut LogBuilder, instance: &str, volume: &str) -> Result<()> {
    let (_, vol) = volume_of(ctx, instance, volume)?;
    delete_logged(
        ctx,
        log,
        ResourceKind::Volume,
        &vol.name,
        secs(ctx.project.timeouts.delete_volume),
    )
    .await
}
