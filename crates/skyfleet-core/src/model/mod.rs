//! Project model
//!
//! Data types of the declarative project description, one module per concern.

mod instance;
mod network;
mod project;
mod security_group;
mod ssh;

// Re-exports
pub use instance::*;
pub use network::*;
pub use project::*;
pub use security_group::*;
pub use ssh::*;
