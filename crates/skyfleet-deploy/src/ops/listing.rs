//! Deployment discovery from the cloud's tag index

use crate::context::TaskContext;
use crate::error::Result;
use crate::log::LogBuilder;
use skyfleet_cloud::listing;

pub async fn list_deployments(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let counts = listing::list_deployments(ctx.reconciler.client().as_ref()).await?;
    if counts.is_empty() {
        log.report("no deployments found");
    }
    for (name, count) in counts {
        log.report(format!("{}: {} resource(s)", name, count));
    }
    Ok(())
}

/// Resources of the loaded project's deployment, one CSV-ish line each
pub async fn list_deployment_resources(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let resources = listing::list_deployment_resources(
        ctx.reconciler.client().as_ref(),
        Some(&ctx.project.deployment_name),
    )
    .await?;
    if resources.is_empty() {
        log.report(format!("no resources found for {}", ctx.project.deployment_name));
    }
    for r in resources {
        log.report(format!(
            "{}, {}, {}, {}, {}, {}",
            r.deployment_name, r.kind, r.name, r.id, r.state, r.billed
        ));
    }
    Ok(())
}
