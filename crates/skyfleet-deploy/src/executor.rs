//! Parallel executor
//!
//! Fans a primitive command out over its targets. Every task goes through the
//! throttle, then takes a worker permit; results come back over a channel and
//! the caller waits for exactly one per target. Tasks never cancel each other.

use crate::error::{DeployError, Result};
use crate::throttle::Throttle;
use colored::Colorize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::debug;

/// Ceiling on concurrently running tasks, whatever the target count
pub const MAX_WORKER_THREADS: usize = 50;

/// What one task reported
#[derive(Debug)]
pub struct TaskOutcome {
    pub target: String,
    pub log: String,
    pub result: Result<()>,
}

/// Receives outcomes as they arrive
pub trait Reporter: Send + Sync {
    fn report(&self, outcome: &TaskOutcome);

    /// Free-form information for the user (hints, listings)
    fn notice(&self, message: &str);
}

/// Prints logs to stdout and errors to stderr
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, outcome: &TaskOutcome) {
        println!("{}", outcome.log);
        if let Err(e) = &outcome.result {
            eprintln!("{}", e.to_string().red());
        }
    }

    fn notice(&self, message: &str) {
        println!("{}", message);
    }
}

/// All outcomes of one step, in completion order
#[derive(Debug, Default)]
pub struct StepReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl StepReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// First error received, if any
    pub fn into_result(self) -> Result<()> {
        self.outcomes
            .into_iter()
            .find_map(|o| o.result.err())
            .map_or(Ok(()), Err)
    }
}

/// Bounded, rate-limited fan-out
#[derive(Clone)]
pub struct Executor {
    throttle: Arc<Throttle>,
    workers: Arc<Semaphore>,
    reporter: Arc<dyn Reporter>,
}

impl Executor {
    pub fn new(throttle: Throttle, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            throttle: Arc::new(throttle),
            workers: Arc::new(Semaphore::new(MAX_WORKER_THREADS)),
            reporter,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(max_workers.max(1)));
        self
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Run `task` once per target and wait for every one of them
    ///
    /// `task` returns the task's log message and result. Outcomes are
    /// reported as they arrive; a task that ends without reporting is
    /// recorded as failed, so the report always has one outcome per target.
    pub async fn run_over_targets<F, Fut>(&self, targets: Vec<String>, task: F) -> StepReport
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = (String, Result<()>)> + Send + 'static,
    {
        let expected = targets.len();
        let (tx, mut rx) = mpsc::channel::<TaskOutcome>(expected.max(1));

        for target in targets.iter().cloned() {
            self.throttle.admit().await;
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Only fails if the semaphore was closed, which never happens
                Err(_) => break,
            };

            let tx = tx.clone();
            let fut = task(target.clone());
            tokio::spawn(async move {
                let (log, result) = fut.await;
                drop(permit);
                let _ = tx
                    .send(TaskOutcome {
                        target,
                        log,
                        result,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut report = StepReport::default();
        let mut reported = BTreeSet::new();
        while report.len() < expected {
            // None: every sender is gone, so whoever is missing will never report
            let Some(outcome) = rx.recv().await else {
                break;
            };
            self.reporter.report(&outcome);
            reported.insert(outcome.target.clone());
            report.outcomes.push(outcome);
        }

        for target in targets {
            if reported.contains(&target) || report.len() >= expected {
                continue;
            }
            let outcome = TaskOutcome {
                log: format!("{} : {}", target, "no result".red()),
                result: Err(DeployError::Task {
                    target: target.clone(),
                    message: "task ended without reporting".to_string(),
                }),
                target,
            };
            self.reporter.report(&outcome);
            report.outcomes.push(outcome);
        }

        debug!(
            "step finished: {} task(s), {} failed",
            report.len(),
            report.failures()
        );
        report
    }
}
