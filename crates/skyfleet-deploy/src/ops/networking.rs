//! VPC, subnets, gateways and routes

use super::{delete_logged, ensure_logged, find_present, perform_once};
use crate::context::{TaskContext, secs};
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{
    NAME_TAG, Query, ResourceAction, ResourceConfig, ResourceKind, ResourceSpec, RouteTarget,
};

const ANYWHERE: &str = "0.0.0.0/0";

pub async fn create(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let network = &ctx.project.network;
    let timeouts = &ctx.project.timeouts;
    let network_timeout = secs(timeouts.create_network);

    let vpc_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &network.name,
            ResourceConfig::Vpc {
                cidr: network.cidr.clone(),
            },
        ),
        network_timeout,
    )
    .await?;

    let private_subnet_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &network.private_subnet.name,
            ResourceConfig::Subnet {
                vpc_id: vpc_id.clone(),
                cidr: network.private_subnet.cidr.clone(),
                availability_zone: network.private_subnet.availability_zone.clone(),
            },
        ),
        network_timeout,
    )
    .await?;

    let public_subnet_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &network.public_subnet.name,
            ResourceConfig::Subnet {
                vpc_id: vpc_id.clone(),
                cidr: network.public_subnet.cidr.clone(),
                availability_zone: network.public_subnet.availability_zone.clone(),
            },
        ),
        network_timeout,
    )
    .await?;

    route_public_subnet(ctx, log, &vpc_id, &public_subnet_id).await?;
    route_private_subnet(ctx, log, &vpc_id, &public_subnet_id, &private_subnet_id).await
}

/// Internet gateway plus the VPC main route table for the public subnet
async fn route_public_subnet(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    vpc_id: &str,
    public_subnet_id: &str,
) -> Result<()> {
    let network = &ctx.project.network;

    let gateway_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(&network.router.name, ResourceConfig::InternetGateway),
        secs(ctx.project.timeouts.create_network),
    )
    .await?;

    let gateway = ctx
        .reconciler
        .describe_by_id(ResourceKind::InternetGateway, &gateway_id)
        .await?
        .ok_or_else(|| {
            DeployError::Invalid(format!("internet gateway {} vanished", network.router.name))
        })?;
    match gateway.active_attachment() {
        None => {
            perform_once(
                ctx,
                log,
                ResourceAction::AttachInternetGateway {
                    gateway_id: gateway_id.clone(),
                    vpc_id: vpc_id.to_string(),
                },
            )
            .await?;
        }
        Some(attachment) if attachment.target_id == vpc_id => {
            log.add(format!(
                "internet gateway {} already attached to {}",
                gateway_id, vpc_id
            ));
        }
        Some(attachment) => {
            return Err(DeployError::Conflict(format!(
                "internet gateway {} is attached to a different vpc {}",
                network.router.name, attachment.target_id
            )));
        }
    }

    let main_table = ctx
        .reconciler
        .client()
        .describe(&Query::main_route_table(vpc_id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            DeployError::Invalid(format!("vpc {} has no main route table", vpc_id))
        })?;

    // Name only, the table goes away with its VPC
    let table_name = network.public_subnet.default_route_table_name();
    ctx.reconciler
        .client()
        .tag(ResourceKind::RouteTable, &main_table.id, NAME_TAG, &table_name)
        .await?;
    log.add(format!("tagged main route table {} as {}", main_table.id, table_name));

    perform_once(
        ctx,
        log,
        ResourceAction::AssociateRouteTable {
            route_table_id: main_table.id.clone(),
            subnet_id: public_subnet_id.to_string(),
        },
    )
    .await?;
    perform_once(
        ctx,
        log,
        ResourceAction::CreateRoute {
            route_table_id: main_table.id,
            destination_cidr: ANYWHERE.to_string(),
            target: RouteTarget::InternetGateway(gateway_id),
        },
    )
    .await
}

/// NAT gateway in the public subnet plus its own route table for the private one
async fn route_private_subnet(
    ctx: &TaskContext,
    log: &mut LogBuilder,
    vpc_id: &str,
    public_subnet_id: &str,
    private_subnet_id: &str,
) -> Result<()> {
    let network = &ctx.project.network;
    let nat_ip_name = &network.public_subnet.nat_gateway_external_ip_address_name;

    let nat_ip = ctx
        .reconciler
        .find_live(ResourceKind::FloatingIp, nat_ip_name)
        .await
        .map_err(DeployError::missing(
            format!("floating ip {}", nat_ip_name),
            "create_floating_ips",
        ))?;

    let nat_gateway_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &network.public_subnet.nat_gateway_name,
            ResourceConfig::NatGateway {
                subnet_id: public_subnet_id.to_string(),
                allocation_id: nat_ip.id,
            },
        ),
        secs(ctx.project.timeouts.create_nat_gateway),
    )
    .await?;

    let route_table_id = ensure_logged(
        ctx,
        log,
        ResourceSpec::new(
            &network.private_subnet.route_table_to_nat_gateway_name,
            ResourceConfig::RouteTable {
                vpc_id: vpc_id.to_string(),
            },
        ),
        secs(ctx.project.timeouts.create_network),
    )
    .await?;

    perform_once(
        ctx,
        log,
        ResourceAction::AssociateRouteTable {
            route_table_id: route_table_id.clone(),
            subnet_id: private_subnet_id.to_string(),
        },
    )
    .await?;
    perform_once(
        ctx,
        log,
        ResourceAction::CreateRoute {
            route_table_id,
            destination_cidr: ANYWHERE.to_string(),
            target: RouteTarget::NatGateway(nat_gateway_id),
        },
    )
    .await
}

pub async fn delete(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let network = &ctx.project.network;
    let timeouts = &ctx.project.timeouts;

    delete_logged(
        ctx,
        log,
        ResourceKind::NatGateway,
        &network.public_subnet.nat_gateway_name,
        secs(timeouts.delete_nat_gateway),
    )
    .await?;

    detach_and_delete_gateway(ctx, log).await?;

    for subnet in [&network.public_subnet.name, &network.private_subnet.name] {
        delete_logged(ctx, log, ResourceKind::Subnet, subnet, secs(timeouts.create_network))
            .await?;
    }

    let Some(vpc) = find_present(ctx, ResourceKind::Vpc, &network.name).await? else {
        log.add(format!("vpc {} not found, nothing to delete", network.name));
        return Ok(());
    };

    let table_name = &network.private_subnet.route_table_to_nat_gateway_name;
    if let Some(table) = find_present(ctx, ResourceKind::RouteTable, table_name).await? {
        if let Some(parent) = table.parent_id.as_deref().filter(|p| *p != vpc.id) {
            return Err(DeployError::Conflict(format!(
                "cannot delete route table {}, it belongs to vpc {} instead of {}",
                table_name, parent, vpc.id
            )));
        }
        ctx.reconciler
            .delete_by_id(ResourceKind::RouteTable, &table.id, secs(timeouts.create_network))
            .await?;
        log.add(format!("deleted route table {} ({})", table_name, table.id));
    }

    ctx.reconciler
        .delete_by_id(ResourceKind::Vpc, &vpc.id, secs(timeouts.create_network))
        .await?;
    log.add(format!("deleted vpc {} ({})", network.name, vpc.id));
    Ok(())
}

async fn detach_and_delete_gateway(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let name = &ctx.project.network.router.name;
    let Some(gateway) = find_present(ctx, ResourceKind::InternetGateway, name).await? else {
        log.add(format!("internet gateway {} not found, nothing to delete", name));
        return Ok(());
    };

    match gateway.active_attachment() {
        Some(attachment) => {
            ctx.reconciler
                .client()
                .perform(&ResourceAction::DetachInternetGateway {
                    gateway_id: gateway.id.clone(),
                    vpc_id: attachment.target_id.clone(),
                })
                .await?;
            log.add(format!(
                "detached internet gateway {} from {}",
                gateway.id, attachment.target_id
            ));
        }
        None => log.add(format!("internet gateway {} was not attached", gateway.id)),
    }

    ctx.reconciler
        .delete_by_id(
            ResourceKind::InternetGateway,
            &gateway.id,
            secs(ctx.project.timeouts.create_network),
        )
        .await?;
    log.add(format!("deleted internet gateway {} ({})", name, gateway.id));
    Ok(())
}
