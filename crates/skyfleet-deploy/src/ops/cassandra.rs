//! Cassandra cluster membership check

use crate::context::TaskContext;
use crate::error::{DeployError, Result};
use crate::log::LogBuilder;
use skyfleet_core::InstancePurpose;

const STATUS_CMD: &str = "nodetool describecluster;nodetool status";

/// Every cassandra node must report itself Up/Normal in `nodetool status`
pub async fn check_status(ctx: &TaskContext, log: &mut LogBuilder) -> Result<()> {
    let nodes: Vec<&str> = ctx
        .project
        .instances_with_purpose(InstancePurpose::Cassandra)
        .map(|(_, def)| def.ip_address.as_str())
        .collect();
    let Some(first) = nodes.first() else {
        return Err(DeployError::Cassandra(
            "cannot find even a single cassandra node".to_string(),
        ));
    };

    let mut result = ctx.shell()?.exec(first, STATUS_CMD).await;
    log.add(result.to_string());
    if let Some(e) = result.error.take() {
        return Err(e.into());
    }

    let missing = missing_nodes(&result.stdout, &nodes);
    if !missing.is_empty() {
        return Err(DeployError::Cassandra(format!(
            "nodes did not join cassandra cluster: {}",
            missing.join(",")
        )));
    }
    log.add(format!("all {} cassandra nodes are up", nodes.len()));
    Ok(())
}

/// Nodes whose address has no `UN  <ip>` line in the status output
fn missing_nodes<'a>(status: &str, nodes: &[&'a str]) -> Vec<&'a str> {
    nodes
        .iter()
        .copied()
        .filter(|ip| {
            let expected = format!("UN  {}", ip);
            !status.lines().any(|line| {
                line.trim_start()
                    .strip_prefix(&expected)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            })
        })
        .collect()
}
