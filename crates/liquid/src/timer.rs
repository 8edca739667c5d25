//! Periodic flush trigger owned by the worker lane.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Interval that can be started, stopped and re-armed.
///
/// The first tick comes one full period after `start`. A zero period
/// disables the timer.
#[derive(Debug)]
pub(crate) struct FlushTimer {
    period: Duration,
    /// Set between `start` and `stop`, even while the period is zero.
    armed: bool,
    interval: Option<Interval>,
}

impl FlushTimer {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            armed: false,
            interval: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// No-op if already running.
    pub(crate) fn start(&mut self) {
        self.armed = true;
        if self.is_running() || self.period.is_zero() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        debug!(period = ?self.period, "flush timer started");
    }

    pub(crate) fn stop(&mut self) {
        self.armed = false;
        if self.interval.take().is_some() {
            debug!("flush timer stopped");
        }
    }

    /// Change the period. A started timer begins a new period right away;
    /// a stopped one picks the period up on its next start.
    pub(crate) fn set_period(&mut self, period: Duration) {
        let armed = self.armed;
        self.stop();
        self.period = period;
        if armed {
            self.start();
        }
    }

    /// Wait for the next tick. Never resolves while stopped.
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
