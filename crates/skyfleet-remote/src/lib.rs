//! skyfleet remote execution
//!
//! Runs shell commands on deployment hosts. Only the bastion has a public
//! address; every other host is reached by opening a session to the bastion
//! and tunnelling a second session through it.
//!
//! [`RemoteExecutor`] implements the hop logic on top of any [`Transport`].
//! [`OpenSshTransport`] is the production transport and drives the system
//! `ssh` binary with one ControlMaster per hop.

pub mod error;
pub mod executor;
pub mod openssh;
pub mod transport;

pub use error::{RemoteError, Result};
pub use executor::{ExecResult, RemoteExecutor, RemoteShell, build_script};
pub use openssh::{OpenSshTransport, SshSession};
pub use transport::{RawOutput, Transport};
