//! The single worker that owns all mutable SDK state.
//!
//! Public operations submit a [`Task`] over a bounded channel; the lane
//! processes tasks strictly in order. User, session, value cache and queue are
//! only ever touched from here, so none of them needs a lock. The flush timer
//! ticks inside the same loop and is therefore ordered with every task.

use crate::attributes::Attributes;
use crate::clock::UniqueClock;
use crate::config::{Config, ResetPolicy};
use crate::device::{new_device_id, Device, DeviceInfo};
use crate::identity::{Identity, Outcome, TrackedEvent};
use crate::notify::{Notification, Notifier};
use crate::queue::{FlushReport, Queuer};
use crate::request::{Endpoints, Request};
use crate::session::Session;
use crate::storage::{Slot, SnapshotStore};
use crate::timer::FlushTimer;
use crate::transport::{Connectivity, Courier};
use crate::types::{DataPoint, ValueRef, VariablePayload};
use crate::user::User;
use crate::values::{DataType, LiquidPackage, ValueCache, ValueSnapshot};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Capacity of the task channel.
pub(crate) const TASK_BUFFER: usize = 1024;

/// Work submitted to the lane.
#[derive(Debug)]
pub(crate) enum Task {
    Track {
        name: String,
        attributes: Attributes,
    },
    Identify {
        id: String,
        attributes: Attributes,
        alias: bool,
    },
    ResetUser,
    SetAttributes {
        attributes: Attributes,
    },
    SetLocation {
        location: Option<(f64, f64)>,
    },
    Flush,
    SetFlushInterval {
        interval: Duration,
    },
    Reset {
        soft: bool,
    },
    Foregrounded,
    Backgrounded,
    CloseSession,
    RequestValues,
    LoadValues,
    Invalidate {
        name: String,
    },
    DiscoverVariable {
        payload: VariablePayload,
    },
    // Queries
    User {
        reply: oneshot::Sender<Option<User>>,
    },
    Session {
        reply: oneshot::Sender<Option<Session>>,
    },
    PendingRequests {
        reply: oneshot::Sender<Vec<Request>>,
    },
    Shutdown {
        reply: oneshot::Sender<FlushReport>,
    },
}

/// Collaborators the lane is built from.
pub(crate) struct LaneParts {
    pub config: Config,
    pub store: SnapshotStore,
    pub courier: Courier,
    pub connectivity: Arc<dyn Connectivity>,
    pub notifier: Notifier,
    pub published: Arc<ArcSwap<ValueSnapshot>>,
    pub device: DeviceInfo,
}

pub(crate) struct Lane {
    endpoints: Endpoints,
    store: SnapshotStore,
    courier: Courier,
    connectivity: Arc<dyn Connectivity>,
    notifier: Notifier,
    published: Arc<ArcSwap<ValueSnapshot>>,
    clock: UniqueClock,
    timer: FlushTimer,
    queue: Queuer,
    identity: Identity,
    persisted_user: Option<User>,
    /// Most recently received package.
    received: ValueCache,
    /// Package readers see.
    loaded: ValueCache,
    device: Device,
    discovered: HashSet<(String, DataType)>,
    development_mode: bool,
    auto_load_values: bool,
    reset_policy: ResetPolicy,
}

impl Lane {
    /// Load persisted state. Nothing is sent until [`run`](Self::run).
    pub(crate) async fn load(parts: LaneParts) -> Self {
        let LaneParts {
            config,
            store,
            courier,
            connectivity,
            notifier,
            published,
            device,
        } = parts;

        let queue = Queuer::load(store.clone(), config.queue_capacity()).await;
        let persisted_user = store.load::<User>(Slot::User).await;

        let device_id = match store.load::<String>(Slot::Device).await {
            Some(id) => id,
            None => {
                let id = new_device_id();
                store.save(Slot::Device, &id).await;
                id
            }
        };

        let package = store
            .load::<LiquidPackage>(Slot::Values)
            .await
            .unwrap_or_default();
        let loaded = ValueCache::new(package.clone());
        published.store(Arc::new(loaded.snapshot()));

        Self {
            endpoints: Endpoints::new(config.api_host()),
            store,
            courier,
            connectivity,
            notifier,
            published,
            clock: UniqueClock::new(),
            timer: FlushTimer::new(config.flush_interval()),
            queue,
            identity: Identity::new(config.session_timeout()),
            persisted_user,
            received: ValueCache::new(package),
            loaded,
            device: Device::new(device_id, device),
            discovered: HashSet::new(),
            development_mode: config.development_mode(),
            auto_load_values: config.auto_load_values(),
            reset_policy: config.reset_policy(),
        }
    }

    /// Process tasks until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self, mut tasks: mpsc::Receiver<Task>) {
        self.start().await;

        loop {
            tokio::select! {
                task = tasks.recv() => {
                    match task {
                        Some(Task::Shutdown { reply }) => {
                            let report = self.shutdown().await;
                            let _ = reply.send(report);
                            break;
                        }
                        Some(task) => self.handle(task).await,
                        None => {
                            debug!("all handles dropped, stopping lane");
                            self.timer.stop();
                            break;
                        }
                    }
                }

                _ = self.timer.tick() => {
                    self.flush().await;
                }
            }
        }

        debug!("lane stopped");
    }

    async fn start(&mut self) {
        let persisted = self.persisted_user.take();
        let outcome = self.identity.restore(persisted, &self.clock);
        self.apply(outcome).await;
        self.timer.start();
    }

    async fn handle(&mut self, task: Task) {
        match task {
            Task::Track { name, attributes } => {
                let outcome = self.identity.track(name, attributes, &self.clock);
                self.apply(outcome).await;
            }
            Task::Identify {
                id,
                attributes,
                alias,
            } => {
                let outcome = self
                    .identity
                    .identify(id, attributes, true, alias, &self.clock);
                self.apply(outcome).await;
            }
            Task::ResetUser => {
                let outcome = self.identity.reset_user(&self.clock);
                self.apply(outcome).await;
            }
            Task::SetAttributes { attributes } => {
                let outcome = self.identity.set_attributes(attributes, &self.clock);
                self.apply(outcome).await;
            }
            Task::SetLocation { location } => {
                self.device.set_location(location);
            }
            Task::Flush => {
                self.flush().await;
            }
            Task::SetFlushInterval { interval } => {
                self.timer.set_period(interval);
            }
            Task::Reset { soft } => {
                self.reset(soft).await;
            }
            Task::Foregrounded => {
                let outcome = self.identity.foregrounded(&self.clock);
                self.apply(outcome).await;
                self.timer.start();
            }
            Task::Backgrounded => {
                self.timer.stop();
                let mut outcome = self.identity.backgrounded(&self.clock);
                let refresh = std::mem::take(&mut outcome.refresh_values);
                self.apply(outcome).await;
                self.flush().await;
                if refresh {
                    self.fetch_values().await;
                }
            }
            Task::CloseSession => {
                let outcome = self.identity.close_session(&self.clock);
                self.apply(outcome).await;
            }
            Task::RequestValues => {
                self.fetch_values().await;
            }
            Task::LoadValues => {
                self.load_values();
            }
            Task::Invalidate { name } => {
                self.invalidate(&name).await;
            }
            Task::DiscoverVariable { payload } => {
                self.discover(payload).await;
            }
            Task::User { reply } => {
                let _ = reply.send(self.identity.user().cloned());
            }
            Task::Session { reply } => {
                let _ = reply.send(self.identity.session().cloned());
            }
            Task::PendingRequests { reply } => {
                let _ = reply.send(self.queue.requests());
            }
            Task::Shutdown { reply } => {
                let _ = reply.send(self.shutdown().await);
            }
        }
    }

    /// Carry out what an identity transition asked for.
    async fn apply(&mut self, outcome: Outcome) {
        for tracked in &outcome.events {
            self.enqueue_data_point(tracked).await;
        }

        if let Some(alias) = &outcome.alias {
            match self.endpoints.alias(&alias.previous_id, &alias.new_id) {
                Ok(request) => {
                    self.queue.enqueue(request).await;
                }
                Err(e) => error!(error = %e, "could not build alias request"),
            }
        }

        if outcome.user_changed {
            if let Some(user) = self.identity.user() {
                self.store.save(Slot::User, user).await;
            }
        }

        if outcome.refresh_values {
            self.fetch_values().await;
        }
    }

    async fn enqueue_data_point(&mut self, tracked: &TrackedEvent) {
        let built = {
            let loaded = self.published.load();
            let point = DataPoint {
                user: &tracked.user,
                device: &self.device,
                session: &tracked.session,
                event: &tracked.event,
                values: loaded.values().iter().map(ValueRef::from).collect(),
                timestamp: self.clock.now(),
            };
            self.endpoints.data_point(&point)
        };
        let request = match built {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, event = %tracked.event.name(), "could not build data point");
                return;
            }
        };
        debug!(event = %tracked.event.name(), "event queued");
        self.queue.enqueue(request).await;
    }

    async fn flush(&mut self) -> FlushReport {
        let now = self.clock.now();
        let report = self
            .queue
            .flush(&self.courier, self.connectivity.as_ref(), now)
            .await;
        if report.sent > 0 || report.failed > 0 {
            info!(
                sent = report.sent,
                failed = report.failed,
                dropped = report.dropped,
                remaining = report.remaining,
                "flushed requests"
            );
        }
        report
    }

    async fn reset(&mut self, soft: bool) {
        info!(soft, "resetting local state");
        self.received.clear();
        self.loaded.clear();
        self.store.save(Slot::Values, self.received.package()).await;
        self.publish();

        if !soft && self.reset_policy == ResetPolicy::ClearQueue {
            self.queue.clear().await;
        }

        self.device.set_location(None);
        let outcome = self.identity.reset(&self.clock);
        self.apply(outcome).await;
    }

    async fn shutdown(&mut self) -> FlushReport {
        info!(pending = self.queue.len(), "shutting down lane");
        self.timer.stop();
        self.flush().await
    }

    // ============================================
    // VALUES
    // ============================================

    async fn fetch_values(&mut self) {
        if !self.connectivity.is_online() {
            debug!("offline, skipping values fetch");
            return;
        }
        let Some(user) = self.identity.user() else {
            return;
        };
        let request = self
            .endpoints
            .liquid_package(user.identifier(), self.device.unique_id());

        let response = match self.courier.deliver(&request).await {
            Ok(response) if response.is_success() => response,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "values fetch failed");
                return;
            }
        };

        match LiquidPackage::from_json(response.body.as_deref().unwrap_or_default()) {
            Ok(package) => self.apply_package(package).await,
            Err(e) => warn!(error = %e, "ignoring malformed liquid package"),
        }
    }

    async fn apply_package(&mut self, package: LiquidPackage) {
        info!(count = package.values().len(), "values received");
        self.received.replace(package);
        self.store.save(Slot::Values, self.received.package()).await;
        self.notifier.notify(Notification::Received);

        if self.auto_load_values {
            self.load_values();
        }
    }

    /// Make the received package the one readers see.
    fn load_values(&mut self) {
        self.loaded.replace(self.received.package().clone());
        self.publish();
        self.notifier.notify(Notification::Loaded);
    }

    fn publish(&self) {
        self.published.store(Arc::new(self.loaded.snapshot()));
    }

    /// Drop a value readers found unusable, along with its target group,
    /// then ask for a fresh package.
    async fn invalidate(&mut self, name: &str) {
        if !self.loaded.invalidate(name) {
            return;
        }
        info!(name, "invalidated value");
        // a later load must not bring the group back
        self.received.invalidate(name);
        self.store.save(Slot::Values, self.loaded.package()).await;
        self.publish();
        self.notifier.notify(Notification::Loaded);
        self.fetch_values().await;
    }

    /// Report a requested variable once per name and type.
    async fn discover(&mut self, payload: VariablePayload) {
        if !self.development_mode {
            return;
        }
        if !self
            .discovered
            .insert((payload.name.clone(), payload.data_type))
        {
            return;
        }
        if !self.connectivity.is_online() {
            debug!(name = %payload.name, "offline, skipping variable report");
            return;
        }
        let request = match self.endpoints.variable(&payload) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "could not build variable request");
                return;
            }
        };
        if let Err(e) = self.courier.deliver(&request).await {
            warn!(error = %e, name = %payload.name, "variable report failed");
        }
    }
}
