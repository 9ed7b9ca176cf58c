//! Convergence polling
//!
//! Every asynchronous cloud operation (instance boot and terminate, image bake,
//! NAT gateway create and delete, volume attach and detach) completes through
//! [`wait_until`].

use crate::error::{CloudError, Result};
use crate::resource::ResourceKind;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Interval and budget of a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll intervals per resource class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub default: Duration,
    pub nat_gateway: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(1),
            nat_gateway: Duration::from_secs(3),
        }
    }
}

impl PollIntervals {
    /// Same interval for every kind; handy in tests
    pub fn uniform(interval: Duration) -> Self {
        Self {
            default: interval,
            nat_gateway: interval,
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::NatGateway => self.nat_gateway,
            _ => self.default,
        }
    }

    pub fn policy(&self, kind: ResourceKind, timeout: Duration) -> PollPolicy {
        PollPolicy::new(self.for_kind(kind), timeout)
    }
}

/// Describe repeatedly until the state is good, bad, or the budget runs out
///
/// A describe error ends the wait immediately; describe implementations turn
/// "resource vanished while it was expected to exist" into `NotFound`.
/// The timeout fires at most one interval after the budget is spent.
pub async fn wait_until<S, D, Fut, G, B>(
    label: &str,
    policy: &PollPolicy,
    mut describe: D,
    is_good: G,
    is_bad: B,
) -> Result<S>
where
    D: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
    G: Fn(&S) -> bool,
    B: Fn(&S) -> bool,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let state = describe().await?;

        if is_good(&state) {
            debug!("{} converged after {} attempt(s)", label, attempts);
            return Ok(state);
        }
        if is_bad(&state) {
            return Err(CloudError::Conflict(format!(
                "{} reached an unexpected terminal state",
                label
            )));
        }
        if started.elapsed() >= policy.timeout {
            return Err(CloudError::Timeout(format!(
                "{} did not converge within {}s",
                label,
                policy.timeout.as_secs_f64()
            )));
        }

        tokio::time::sleep(policy.interval).await;
    }
}
