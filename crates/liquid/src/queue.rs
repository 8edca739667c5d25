//! Durable request queue with retry bookkeeping.

use crate::request::Request;
use crate::storage::{Slot, SnapshotStore};
use crate::transport::{Connectivity, Courier};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Result of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// FIFO of pending requests, mirrored to storage after every change.
#[derive(Debug)]
pub(crate) struct Queuer {
    requests: VecDeque<Request>,
    capacity: usize,
    store: SnapshotStore,
}

impl Queuer {
    /// Restore the persisted queue, or start empty.
    pub(crate) async fn load(store: SnapshotStore, capacity: usize) -> Self {
        let mut requests: VecDeque<Request> = store
            .load::<Vec<Request>>(Slot::Queue)
            .await
            .unwrap_or_default()
            .into();
        while requests.len() > capacity {
            requests.pop_front();
        }
        if !requests.is_empty() {
            info!(count = requests.len(), "restored pending requests");
        }
        Self {
            requests,
            capacity,
            store,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.iter().cloned().collect()
    }

    /// Append a request. Returns true when the oldest one was evicted to
    /// stay within capacity.
    pub(crate) async fn enqueue(&mut self, request: Request) -> bool {
        self.requests.push_back(request);
        let overflowed = self.requests.len() > self.capacity;
        if overflowed {
            self.requests.pop_front();
            warn!(capacity = self.capacity, "queue full, dropped oldest request");
        }
        self.persist().await;
        overflowed
    }

    pub(crate) async fn clear(&mut self) {
        self.requests.clear();
        self.persist().await;
    }

    /// Try to send every request whose cooldown has elapsed.
    ///
    /// A success removes the request. A failure counts an attempt; the request
    /// is dropped once its attempts reach the limit. Auth failures don't
    /// start a cooldown. Does nothing while offline.
    pub(crate) async fn flush(
        &mut self,
        courier: &Courier,
        connectivity: &dyn Connectivity,
        now: DateTime<Utc>,
    ) -> FlushReport {
        let mut report = FlushReport {
            remaining: self.requests.len(),
            ..Default::default()
        };
        if self.requests.is_empty() {
            return report;
        }
        if !connectivity.is_online() {
            debug!(pending = self.requests.len(), "offline, skipping flush");
            return report;
        }

        let pending = std::mem::take(&mut self.requests);
        for mut request in pending {
            if !request.can_send(now) {
                self.requests.push_back(request);
                continue;
            }

            let auth_failure = match courier.deliver(&request).await {
                Ok(response) if response.is_success() => {
                    report.sent += 1;
                    continue;
                }
                Ok(response) => response.is_auth_failure(),
                Err(e) => {
                    warn!(error = %e, url = %request.url(), "request failed");
                    false
                }
            };

            report.failed += 1;
            request.record_failure(now, auth_failure);
            if request.is_exhausted() {
                warn!(
                    url = %request.url(),
                    attempts = request.attempts(),
                    "dropping request after too many attempts"
                );
                report.dropped += 1;
            } else {
                self.requests.push_back(request);
            }
        }

        report.remaining = self.requests.len();
        self.persist().await;
        debug!(?report, "flush finished");
        report
    }

    async fn persist(&self) {
        let snapshot: Vec<&Request> = self.requests.iter().collect();
        self.store.save(Slot::Queue, &snapshot).await;
    }
}
