//! skyfleet deployment orchestration
//!
//! Turns a command name and a target pattern into cloud and remote work:
//!
//! - [`Command`]: every primitive and composite command
//! - [`sequencer`]: composite commands as ordered steps with a failure policy
//! - [`executor`]: fan-out over targets with a rate limiter, a bounded worker
//!   pool and a counted barrier
//! - [`ops`]: the primitive commands themselves
//! - [`Deployer`]: ties the above to a loaded project

pub mod command;
pub mod context;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod log;
pub mod ops;
pub mod sequencer;
pub mod throttle;

pub use command::{Command, CommandScope};
pub use context::{DeployOptions, OpenSshShellFactory, ShellFactory, TaskContext};
pub use deployer::Deployer;
pub use error::{DeployError, Result};
pub use executor::{ConsoleReporter, Executor, Reporter, StepReport, TaskOutcome};
pub use log::LogBuilder;
pub use sequencer::{OnFail, Step, StepRunner};
pub use throttle::Throttle;
