//! Name-based reconciliation
//!
//! One algorithm for every resource kind: look the resource up by its `Name`
//! tag within the deployment, then decide between reuse, wait, create and
//! conflict. Identifiers are never cached between calls.

use crate::client::CloudClient;
use crate::error::{CloudError, Result};
use crate::poller::{PollIntervals, wait_until};
use crate::resource::{ObservedResource, Presence, Query, ResourceKind};
use crate::spec::ResourceSpec;
use crate::{DEPLOYMENT_NAME_TAG, DEPLOYMENT_OPERATOR, DEPLOYMENT_OPERATOR_TAG, NAME_TAG};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of [`Reconciler::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured {
    /// Already present (possibly after waiting for it to converge)
    Existing(String),
    Created(String),
}

impl Ensured {
    pub fn id(&self) -> &str {
        match self {
            Ensured::Existing(id) | Ensured::Created(id) => id,
        }
    }

    pub fn into_id(self) -> String {
        match self {
            Ensured::Existing(id) | Ensured::Created(id) => id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Ensured::Created(_))
    }
}

/// Outcome of [`Reconciler::delete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// Nothing to delete
    Absent,
    Deleted(String),
}

/// Reconciles named resources of one deployment
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn CloudClient>,
    deployment_name: String,
    intervals: PollIntervals,
}

impl Reconciler {
    pub fn new(client: Arc<dyn CloudClient>, deployment_name: impl Into<String>) -> Self {
        Self {
            client,
            deployment_name: deployment_name.into(),
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn client(&self) -> &Arc<dyn CloudClient> {
        &self.client
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }

    pub fn intervals(&self) -> &PollIntervals {
        &self.intervals
    }

    /// Tags every resource of this deployment carries
    pub fn deployment_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (DEPLOYMENT_NAME_TAG.to_string(), self.deployment_name.clone()),
            (
                DEPLOYMENT_OPERATOR_TAG.to_string(),
                DEPLOYMENT_OPERATOR.to_string(),
            ),
        ])
    }

    /// Apply the deployment tags to a resource created outside [`Self::ensure`]
    /// (image snapshots, the VPC's main route table)
    pub async fn tag_with_deployment(&self, kind: ResourceKind, id: &str) -> Result<()> {
        for (key, value) in self.deployment_tags() {
            self.client.tag(kind, id, &key, &value).await?;
        }
        Ok(())
    }

    /// Look a resource up by name
    ///
    /// Tagged kinds are searched within this deployment only; key pairs and
    /// instance types by their provider-side name. Gone resources sort last.
    ///
    /// Two live resources sharing a name are a `Conflict`, except for
    /// instances, where racing reservations can leave duplicates behind. For
    /// those the same one is picked every time: ready before converging
    /// before anything else, then the lowest id, and the duplicates are logged.
    pub async fn find(&self, kind: ResourceKind, name: &str) -> Result<Option<ObservedResource>> {
        let mut query = Query::by_name(kind, name);
        if ResourceKind::TAGGED.contains(&kind) {
            query = query.with_tag(DEPLOYMENT_NAME_TAG, self.deployment_name.as_str());
        }

        let mut candidates = self.client.describe(&query).await?;
        candidates.sort_by(|a, b| {
            a.presence()
                .cmp(&b.presence())
                .then_with(|| a.id.cmp(&b.id))
        });

        let live: Vec<&str> = candidates
            .iter()
            .filter(|r| r.presence() != Presence::Absent)
            .map(|r| r.id.as_str())
            .collect();
        if live.len() > 1 {
            if kind != ResourceKind::Instance {
                return Err(CloudError::Conflict(format!(
                    "{} resources of kind {} are named {}: {}",
                    live.len(),
                    kind,
                    name,
                    live.join(", ")
                )));
            }
            warn!(
                "{} {}: {} resources share this name ({}), using {}",
                kind,
                name,
                live.len(),
                live.join(", "),
                live[0]
            );
        }

        Ok(candidates.into_iter().next())
    }

    /// Like [`Self::find`], but a missing or gone resource is `NotFound`
    pub async fn find_live(&self, kind: ResourceKind, name: &str) -> Result<ObservedResource> {
        match self.find(kind, name).await? {
            Some(found) if found.presence() != Presence::Absent => Ok(found),
            _ => Err(CloudError::NotFound(format!("{} {}", kind, name))),
        }
    }

    pub async fn describe_by_id(
        &self,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<ObservedResource>> {
        match self.client.describe(&Query::by_id(kind, id)).await {
            Ok(found) => Ok(found.into_iter().next()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make sure a resource named `spec.name` exists and is ready
    pub async fn ensure(&self, spec: &ResourceSpec, timeout: Duration) -> Result<Ensured> {
        let kind = spec.kind();

        if let Some(found) = self.find(kind, &spec.name).await? {
            match found.presence() {
                Presence::Ready => {
                    debug!("{} {} already exists: {}", kind, spec.name, found.id);
                    return Ok(Ensured::Existing(found.id));
                }
                Presence::Converging => {
                    info!("{} {} exists, waiting for {}", kind, spec.name, found.id);
                    self.wait_ready(kind, &found.id, timeout).await?;
                    return Ok(Ensured::Existing(found.id));
                }
                Presence::Invalid => {
                    return Err(CloudError::Conflict(format!(
                        "{} {} ({}) exists in state {}",
                        kind, spec.name, found.id, found.state
                    )));
                }
                Presence::Absent => {
                    debug!(
                        "{} {} ({}) is {}, creating a new one",
                        kind, spec.name, found.id, found.state
                    );
                }
            }
        }

        let mut tagged = spec.clone();
        tagged.tags.extend(self.deployment_tags());
        tagged
            .tags
            .insert(NAME_TAG.to_string(), spec.name.clone());

        let id = self.client.create(&tagged).await?;
        info!("created {} {}: {}", kind, spec.name, id);
        self.wait_ready(kind, &id, timeout).await?;

        Ok(Ensured::Created(id))
    }

    /// Delete the resource named `name`, waiting until it is gone
    pub async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        timeout: Duration,
    ) -> Result<Removal> {
        let found = match self.find(kind, name).await? {
            Some(found) if found.presence() != Presence::Absent => found,
            _ => {
                debug!("{} {} not found, nothing to delete", kind, name);
                return Ok(Removal::Absent);
            }
        };

        self.delete_by_id(kind, &found.id, timeout).await?;
        info!("deleted {} {}: {}", kind, name, found.id);
        Ok(Removal::Deleted(found.id))
    }

    pub async fn delete_by_id(&self, kind: ResourceKind, id: &str, timeout: Duration) -> Result<()> {
        match self.client.delete(kind, id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        let policy = self.intervals.policy(kind, timeout);
        let label = format!("{} {} deletion", kind, id);
        wait_until(
            &label,
            &policy,
            move || self.describe_by_id(kind, id),
            |found| {
                found
                    .as_ref()
                    .is_none_or(|r| r.presence() == Presence::Absent)
            },
            |_| false,
        )
        .await?;
        Ok(())
    }

    /// Wait until the resource is ready; gone or invalid ends the wait with an error
    pub async fn wait_ready(
        &self,
        kind: ResourceKind,
        id: &str,
        timeout: Duration,
    ) -> Result<ObservedResource> {
        self.wait_for(
            kind,
            id,
            timeout,
            |r| r.presence() == Presence::Ready,
            |r| matches!(r.presence(), Presence::Invalid | Presence::Absent),
        )
        .await
    }

    /// Poll one resource by id until `is_good` or `is_bad` holds
    ///
    /// A resource that disappears while being waited on is `NotFound`.
    pub async fn wait_for<G, B>(
        &self,
        kind: ResourceKind,
        id: &str,
        timeout: Duration,
        is_good: G,
        is_bad: B,
    ) -> Result<ObservedResource>
    where
        G: Fn(&ObservedResource) -> bool,
        B: Fn(&ObservedResource) -> bool,
    {
        let policy = self.intervals.policy(kind, timeout);
        let label = format!("{} {}", kind, id);
        wait_until(
            &label,
            &policy,
            move || async move {
                self.describe_by_id(kind, id).await.and_then(|found| {
                    found.ok_or_else(|| CloudError::NotFound(format!("{} {}", kind, id)))
                })
            },
            is_good,
            is_bad,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceState;
    use crate::sandbox::SandboxCloud;
    use crate::spec::ResourceConfig;

    fn reconciler(cloud: &Arc<SandboxCloud>) -> Reconciler {
        Reconciler::new(cloud.clone(), "sample")
            .with_intervals(PollIntervals::uniform(Duration::from_millis(10)))
    }

    fn vpc_spec() -> ResourceSpec {
        ResourceSpec::new(
            "net",
            ResourceConfig::Vpc {
                cidr: "10.5.0.0/16".into(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_prefers_ready_then_lowest_id() {
        let cloud = Arc::new(SandboxCloud::new());
        for (id, state) in [
            ("i-3", ResourceState::Running),
            ("i-1", ResourceState::Pending),
            ("i-2", ResourceState::Running),
            ("i-0", ResourceState::Terminated),
        ] {
            cloud.insert(
                ObservedResource::new(ResourceKind::Instance, id)
                    .with_name("web")
                    .with_state(state)
                    .with_tag(DEPLOYMENT_NAME_TAG, "sample"),
            );
        }

        let found = reconciler(&cloud)
            .find(ResourceKind::Instance, "web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "i-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_duplicate_live_vpcs_is_conflict() {
        let cloud = Arc::new(SandboxCloud::new());
        for (id, state) in [
            ("vpc-1", ResourceState::Available),
            ("vpc-2", ResourceState::Pending),
        ] {
            cloud.insert(
                ObservedResource::new(ResourceKind::Vpc, id)
                    .with_name("net")
                    .with_state(state)
                    .with_tag(DEPLOYMENT_NAME_TAG, "sample"),
            );
        }

        let err = reconciler(&cloud)
            .find(ResourceKind::Vpc, "net")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, CloudError::Conflict(_)));
        assert!(message.contains("vpc-1, vpc-2"), "{}", message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_single_live_among_gone_ones() {
        let cloud = Arc::new(SandboxCloud::new());
        for (id, state) in [
            ("ami-1", ResourceState::Deregistered),
            ("ami-2", ResourceState::Available),
            ("ami-3", ResourceState::Deregistered),
        ] {
            cloud.insert(
                ObservedResource::new(ResourceKind::Image, id)
                    .with_name("sample-cass01")
                    .with_state(state)
                    .with_tag(DEPLOYMENT_NAME_TAG, "sample"),
            );
        }

        let found = reconciler(&cloud)
            .find(ResourceKind::Image, "sample-cass01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "ami-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_ignores_other_deployments() {
        let cloud = Arc::new(SandboxCloud::new());
        cloud.insert(
            ObservedResource::new(ResourceKind::Vpc, "vpc-9")
                .with_name("net")
                .with_state(ResourceState::Available)
                .with_tag(DEPLOYMENT_NAME_TAG, "other"),
        );

        let found = reconciler(&cloud).find(ResourceKind::Vpc, "net").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_invalid_state_is_conflict() {
        let cloud = Arc::new(SandboxCloud::new());
        cloud.insert(
            ObservedResource::new(ResourceKind::Vpc, "vpc-1")
                .with_name("net")
                .with_state(ResourceState::Failed)
                .with_tag(DEPLOYMENT_NAME_TAG, "sample"),
        );

        let err = reconciler(&cloud)
            .ensure(&vpc_spec(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
        assert_eq!(cloud.create_calls(ResourceKind::Vpc), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_waits_for_converging_resource() {
        let cloud = Arc::new(SandboxCloud::new().with_convergence(2));
        let reconciler = reconciler(&cloud);

        // Created by an earlier run that gave up before it converged
        let mut spec = vpc_spec();
        spec.tags = reconciler.deployment_tags();
        let id = cloud.create(&spec).await.unwrap();

        let ensured = reconciler
            .ensure(&vpc_spec(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ensured, Ensured::Existing(id));
        assert_eq!(cloud.create_calls(ResourceKind::Vpc), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_tags_created_resource() {
        let cloud = Arc::new(SandboxCloud::new());
        let ensured = reconciler(&cloud)
            .ensure(&vpc_spec(), Duration::from_secs(5))
            .await
            .unwrap();

        let vpc = &cloud.resources(ResourceKind::Vpc)[0];
        assert_eq!(vpc.id, ensured.id());
        assert_eq!(vpc.tag(NAME_TAG), Some("net"));
        assert_eq!(vpc.tag(DEPLOYMENT_NAME_TAG), Some("sample"));
        assert_eq!(vpc.tag(DEPLOYMENT_OPERATOR_TAG), Some(DEPLOYMENT_OPERATOR));
    }
}
