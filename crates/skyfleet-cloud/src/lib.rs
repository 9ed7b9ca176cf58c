//! skyfleet Cloud Infrastructure
//!
//! This crate provides the cloud resource client abstraction for skyfleet and
//! the two algorithms every resource kind shares: reconciliation by name and
//! convergence polling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 skyfleet-deploy                  │
//! │        (primitive and composite commands)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 skyfleet-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Client Abstraction               │   │
//! │  │  trait CloudClient { describe, create,    │   │
//! │  │                      delete, tag, ... }   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Reconciler  │  │    Poller    │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  aws ec2 CLI  │ │    sandbox    │
//! │    client     │ │  (in-memory)  │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! There is no local state file. The cloud's tag index is the only record of
//! what exists: every resource carries a `Name` tag plus the deployment tags,
//! and every command re-discovers identifiers by querying for them.

pub mod client;
pub mod error;
pub mod listing;
pub mod poller;
pub mod reconcile;
pub mod resource;
pub mod sandbox;
pub mod spec;

pub use client::CloudClient;
pub use error::{CloudError, Result};
pub use listing::{BilledState, DeploymentResource, list_deployment_resources, list_deployments};
pub use poller::{PollIntervals, PollPolicy, wait_until};
pub use reconcile::{Ensured, Reconciler, Removal};
pub use resource::*;
pub use sandbox::{SandboxCloud, SandboxOp};
pub use spec::*;

/// Tag holding the logical name of a resource
pub const NAME_TAG: &str = "Name";

/// Tag holding the deployment a resource belongs to
pub const DEPLOYMENT_NAME_TAG: &str = "DeploymentName";

/// Tag marking resources created by skyfleet
pub const DEPLOYMENT_OPERATOR_TAG: &str = "DeploymentOperator";

/// Value of [`DEPLOYMENT_OPERATOR_TAG`]
pub const DEPLOYMENT_OPERATOR: &str = "skyfleet";
