//! Tag-based deployment discovery
//!
//! The cloud's tag index is the only record of deployments, so listing is a
//! describe of every tagged kind filtered on the operator tag.

use crate::client::CloudClient;
use crate::error::Result;
use crate::resource::{Query, ResourceKind, ResourceState};
use crate::{DEPLOYMENT_NAME_TAG, DEPLOYMENT_OPERATOR, DEPLOYMENT_OPERATOR_TAG};
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether a resource still costs money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BilledState {
    Active,
    Terminated,
    Unknown,
}

impl BilledState {
    pub fn from_state(state: ResourceState) -> Self {
        match state {
            ResourceState::Terminated
            | ResourceState::Deleted
            | ResourceState::Deregistered
            | ResourceState::Failed => BilledState::Terminated,
            ResourceState::Unknown => BilledState::Unknown,
            _ => BilledState::Active,
        }
    }
}

impl std::fmt::Display for BilledState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BilledState::Active => write!(f, "active"),
            BilledState::Terminated => write!(f, "terminated"),
            BilledState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One resource of some deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResource {
    pub deployment_name: String,
    pub kind: ResourceKind,
    pub name: String,
    pub id: String,
    pub state: ResourceState,
    pub billed: BilledState,
}

/// Resource counts per deployment name
pub async fn list_deployments(client: &dyn CloudClient) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for resource in list_deployment_resources(client, None).await? {
        *counts.entry(resource.deployment_name).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Every resource created by skyfleet, optionally restricted to one deployment
///
/// Ordered by deployment, kind, name and id.
pub async fn list_deployment_resources(
    client: &dyn CloudClient,
    deployment_name: Option<&str>,
) -> Result<Vec<DeploymentResource>> {
    let mut listed = Vec::new();

    for kind in ResourceKind::TAGGED {
        let mut query = Query::new(kind).with_tag(DEPLOYMENT_OPERATOR_TAG, DEPLOYMENT_OPERATOR);
        if let Some(name) = deployment_name {
            query = query.with_tag(DEPLOYMENT_NAME_TAG, name);
        }

        for resource in client.describe(&query).await? {
            listed.push(DeploymentResource {
                deployment_name: resource.tag(DEPLOYMENT_NAME_TAG).unwrap_or_default().to_string(),
                kind,
                name: resource.name.clone().unwrap_or_default(),
                billed: BilledState::from_state(resource.state),
                state: resource.state,
                id: resource.id,
            });
        }
    }

    listed.sort_by(|a, b| {
        (&a.deployment_name, a.kind, &a.name, &a.id).cmp(&(&b.deployment_name, b.kind, &b.name, &b.id))
    });
    Ok(listed)
}
