//! skyfleet core
//!
//! The declarative side of skyfleet: the project description a deployment is
//! built from, the loader that turns a JSON file into a validated [`Project`],
//! and target pattern resolution used by every fan-out command.
//!
//! Nothing in this crate talks to the cloud or to remote hosts. Runtime values
//! (such as the bastion's public address) are filled in by the deploy layer
//! after querying the cloud.

pub mod error;
pub mod loader;
pub mod model;
pub mod target;

pub use error::{ProjectError, Result};
pub use loader::{BASTION_IP_PLACEHOLDER, load_project, load_project_from_str, substitute_env_vars};
pub use model::*;
pub use target::resolve_targets;
