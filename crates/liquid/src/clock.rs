//! Strictly increasing wall-clock timestamps.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out millisecond timestamps that never repeat, so events recorded
/// back to back (session end followed by session start) keep their order on
/// the server.
#[derive(Debug, Default)]
pub(crate) struct UniqueClock {
    last_ms: AtomicI64,
    #[cfg(test)]
    skew_ms: AtomicI64,
}

impl UniqueClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        let wall = self.wall_ms();
        let mut prev = self.last_ms.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last_ms
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return DateTime::from_timestamp_millis(next).unwrap_or_else(Utc::now),
                Err(actual) => prev = actual,
            }
        }
    }

    fn wall_ms(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        #[cfg(test)]
        let wall = wall + self.skew_ms.load(Ordering::Relaxed);
        wall
    }

    /// Move the clock forward, as if the given time had passed.
    #[cfg(test)]
    pub(crate) fn advance(&self, by: std::time::Duration) {
        self.skew_ms.fetch_add(by.as_millis() as i64, Ordering::Relaxed);
    }
}
