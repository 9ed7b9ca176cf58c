//! Cloud resource client trait definition

use crate::error::Result;
use crate::resource::{ObservedResource, Query, ResourceKind};
use crate::spec::{ResourceAction, ResourceSpec};
use async_trait::async_trait;

/// Cloud resource client abstraction
///
/// A thin request/response contract over the provider's control plane.
/// Implementations do not wait for anything: create and delete return as
/// soon as the control plane accepted the call, and callers observe
/// convergence through [`CloudClient::describe`].
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Returns the client name (e.g., "aws", "sandbox")
    fn name(&self) -> &str;

    /// List resources matching the query
    ///
    /// Nothing matching is an empty vector, not an error. Describe is assumed
    /// to be eventually consistent.
    async fn describe(&self, query: &Query) -> Result<Vec<ObservedResource>>;

    /// Create a resource and return its provider identifier
    ///
    /// `spec.tags` are applied to the new resource.
    async fn create(&self, spec: &ResourceSpec) -> Result<String>;

    /// Delete (terminate, deregister, release) a resource by identifier
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Set a tag on an existing resource
    async fn tag(&self, kind: ResourceKind, id: &str, key: &str, value: &str) -> Result<()>;

    /// Perform a non-create mutation
    ///
    /// Returns [`crate::CloudError::AlreadyExists`] when the mutation is
    /// already in effect (duplicate rule, existing route).
    async fn perform(&self, action: &ResourceAction) -> Result<()>;
}
