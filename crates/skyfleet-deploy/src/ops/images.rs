//! Snapshot images of instances
//!
//! An image is named after the instance's host name, so an instance can be
//! deleted and later brought back from it with the same identity.

use super::instances::attached_volumes;
use super::{ensure_logged, find_present, perform_once};
use crate::context::{TaskContext, secs};
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{
    NAME_TAG, Presence, ResourceAction, ResourceConfig, ResourceKind, ResourceSpec, ResourceState,
};

pub async fn create_snapshot(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    let def = ctx.instance(nickname)?;
    let timeouts = &ctx.project.timeouts;

    if let Some(image) = find_present(ctx, ResourceKind::Image, &def.inst_name).await? {
        return Err(DeployError::Conflict(format!(
            "cannot create snapshot image {}, delete or deregister existing image {} first",
            def.inst_name, image.id
        )));
    }

    let attached = attached_volumes(ctx, def).await?;
    if !attached.is_empty() {
        return Err(DeployError::Conflict(format!(
            "cannot create snapshot image from instance {}, detach volumes first: {}",
            nickname,
            attached.join(",")
        )));
    }

    let instance = find_present(ctx, ResourceKind::Instance, &def.inst_name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!("instance {}", def.inst_name),
            hint: "create_instances",
        })?;

    match instance.state {
        ResourceState::Stopped => log.add(format!("instance {} already stopped", instance.id)),
        ResourceState::Running => {
            perform_once(
                ctx,
                log,
                ResourceAction::StopInstance {
                    instance_id: instance.id.clone(),
                },
            )
            .await?;
            ctx.reconciler
                .wait_for(
                    ResourceKind::Instance,
                    &instance.id,
                    secs(timeouts.stop_instance),
                    |i| i.state == ResourceState::Stopped,
                    |i| i.presence() == Presence::Absent,
                )
                .await?;
            log.add(format!("stopped instance {}", instance.id));
        }
        state => {
            return Err(DeployError::Conflict(format!(
                "cannot create snapshot image from instance {}, instance state is {}, expected running or stopped",
                nickname, state
            )));
        }
    }

    let image_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &def.inst_name,
            ResourceConfig::Image {
                instance_id: instance.id,
            },
        ),
        secs(timeouts.create_image),
    )
    .await?;

    // Snapshots are billed; tag them so listing and cleanup can see them
    let image = ctx
        .reconciler
        .describe_by_id(ResourceKind::Image, &image_id)
        .await?
        .ok_or_else(|| DeployError::Invalid(format!("image {} vanished", image_id)))?;
    for snapshot_id in &image.snapshot_ids {
        ctx.reconciler
            .tag_with_deployment(ResourceKind::Snapshot, snapshot_id)
            .await?;
        ctx.reconciler
            .client()
            .tag(ResourceKind::Snapshot, snapshot_id, NAME_TAG, &def.inst_name)
            .await?;
        log.add(format!("tagged snapshot {} of image {}", snapshot_id, image_id));
    }
    Ok(())
}

pub async fn delete_snapshot(ctx: &TaskContext, log: &mut LogBuilder, nickname: &str) -> Result<()> {
    let def = ctx.instance(nickname)?;

    let Some(image) = find_present(ctx, ResourceKind::Image, &def.inst_name).await? else {
        log.add(format!(
            "snapshot image {} not found or deregistered, nothing to delete",
            def.inst_name
        ));
        return Ok(());
    };

    ctx.reconciler
        .delete_by_id(
            ResourceKind::Image,
            &image.id,
            secs(ctx.project.timeouts.create_image),
        )
        .await?;
    log.add(format!("deregistered image {} ({})", def.inst_name, image.id));

    for snapshot_id in &image.snapshot_ids {
        match ctx
            .reconciler
            .client()
            .delete(ResourceKind::Snapshot, snapshot_id)
            .await
        {
            Ok(()) => log.add(format!("deleted snapshot {}", snapshot_id)),
            Err(e) if e.is_not_found() => log.add(format!("snapshot {} already gone", snapshot_id)),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
