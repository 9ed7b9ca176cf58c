//! Security groups and their rules

use super::{delete_logged, ensure_logged, find_present, perform_once};
use crate::context::{TaskContext, secs};
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_cloud::{
    ResourceAction, ResourceConfig, ResourceKind, ResourceSpec, SecurityRule, TrafficDirection,
};
use skyfleet_core::{RuleDirection, SecurityGroupRuleDef};

pub async fn create(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let vpc_name = &ctx.project.network.name;
    let vpc = find_present(ctx, ResourceKind::Vpc, vpc_name)
        .await?
        .ok_or_else(|| DeployError::Missing {
            what: format!("vpc {}", vpc_name),
            hint: "create_networking",
        })?;

    for group in ctx.project.security_groups.values() {
        let group_id = ensure_logged(
            ctx,
            log,
            ResourceSpec::new(
                &group.name,
                ResourceConfig::SecurityGroup {
                    vpc_id: vpc.id.clone(),
                    description: group.name.clone(),
                },
            ),
            secs(ctx.project.timeouts.create_network),
        )
        .await?;

        for rule in &group.rules {
            perform_once(
                ctx,
                log,
                ResourceAction::AuthorizeRule {
                    group_id: group_id.clone(),
                    rule: to_cloud_rule(rule),
                },
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn delete(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    for group in ctx.project.security_groups.values() {
        delete_logged(
            ctx,
            log,
            ResourceKind::SecurityGroup,
            &group.name,
            secs(ctx.project.timeouts.create_network),
        )
        .await?;
    }
    Ok(())
}

fn to_cloud_rule(rule: &SecurityGroupRuleDef) -> SecurityRule {
    SecurityRule {
        protocol: rule.protocol.clone(),
        port: rule.port,
        cidr: rule.remote_ip.clone(),
        direction: match rule.direction {
            RuleDirection::Ingress => TrafficDirection::Ingress,
            RuleDirection::Egress => TrafficDirection::Egress,
        },
    }
}
