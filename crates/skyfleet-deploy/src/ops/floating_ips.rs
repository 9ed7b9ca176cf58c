//! Floating IPs: the bastion's public address and the NAT gateway's

use crate::context::TaskContext;
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{ResourceConfig, ResourceKind, ResourceSpec};
use std::time::Duration;

// Allocation is synchronous; the wait only covers describe lag
const ALLOCATE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn create(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let bastion_ip_name = &ctx.project.ssh_config.bastion_external_ip_address_name;
    let address = ensure(ctx, log, bastion_ip_name).await?;
    log.report(format!("bastion ip {}: {}", bastion_ip_name, address));

    let nat_ip_name = &ctx.project.network.public_subnet.nat_gateway_external_ip_address_name;
    ensure(ctx, log, nat_ip_name).await?;
    Ok(())
}

/// Allocate `name` unless it already exists; returns the public address
async fn ensure(ctx: &TaskContext, log: &mut LogBuilder, name: &str) -> Result<String> {
    let ensured = ctx
        .reconciler
        .ensure(
            &ResourceSpec::new(name, ResourceConfig::FloatingIp),
            ALLOCATE_TIMEOUT,
        )
        .await?;
    let found = ctx
        .reconciler
        .describe_by_id(ResourceKind::FloatingIp, ensured.id())
        .await?
        .and_then(|r| r.address)
        .ok_or_else(|| {
            DeployError::Invalid(format!("floating ip {} has no public address", name))
        })?;

    if ensured.is_created() {
        log.add(format!("allocated floating ip {}: {} ({})", name, found, ensured.id()));
    } else {
        log.add(format!("floating ip {} already there: {} ({})", name, found, ensured.id()));
    }
    Ok(found)
}

pub async fn delete(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    release(ctx, log, &ctx.project.ssh_config.bastion_external_ip_address_name).await?;
    release(
        ctx,
        log,
        &ctx.project.network.public_subnet.nat_gateway_external_ip_address_name,
    )
    .await
}

async fn release(ctx: &TaskContext, log: &mut LogBuilder, name: &str) -> Result<()> {
    let found = match super::find_present(ctx, ResourceKind::FloatingIp, name).await? {
        Some(found) => found,
        None => {
            log.add(format!("floating ip {} not allocated, nothing to release", name));
            return Ok(());
        }
    };

    if let Some(attachment) = found.active_attachment() {
        return Err(DeployError::Conflict(format!(
            "cannot release ip named {}, it is associated with instance {}",
            name, attachment.target_id
        )));
    }

    ctx.reconciler
        .delete_by_id(ResourceKind::FloatingIp, &found.id, ALLOCATE_TIMEOUT)
        .await?;
    log.add(format!("released floating ip {} ({})", name, found.id));
    Ok(())
}
