//! Admission gate for control-plane calls

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior};

/// Admits one caller per tick
///
/// Created lazily so it can be built outside a runtime. The first admission
/// is immediate.
pub struct Throttle {
    period: Duration,
    interval: Mutex<Option<Interval>>,
}

impl Throttle {
    /// One admission per `period`; a zero period admits everyone at once
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: Mutex::new(None),
        }
    }

    /// One admission per second, the pace the cloud control planes tolerate
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn admit(&self) {
        if self.period.is_zero() {
            return;
        }
        let mut guard = self.interval.lock().await;
        let interval = guard.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}
