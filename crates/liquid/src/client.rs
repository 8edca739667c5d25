//! Liquid client implementation.

use crate::attributes::{self, AttributeValue, Attributes};
use crate::builders::{IdentifyBuilder, TrackBuilder};
use crate::config::{Config, LiquidBuilder};
use crate::lane::{Lane, LaneParts, Task, TASK_BUFFER};
use crate::notify::{InlineDispatcher, ListenerId, Notifier, ValuesListener};
use crate::queue::FlushReport;
use crate::request::Request;
use crate::session::Session;
use crate::storage::{default_storage, SnapshotStore};
use crate::transport::{AlwaysOnline, Courier, HttpTransport, Transport};
use crate::user::User;
use crate::values::{discovery_payload, Color, Lookup, ValueSnapshot, VariableType};
use crate::Error;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

/// Liquid analytics and remote-values client.
///
/// Every mutating call is handed to a background worker and processed in
/// submission order. Variable getters read the last loaded values directly
/// and never wait for the worker.
///
/// # Example
///
/// ```rust,no_run
/// use liquid::Liquid;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), liquid::Error> {
///     let client = Liquid::builder("tok_xxx")
///         .storage_dir("/var/lib/my-app/liquid")
///         .flush_interval(Duration::from_secs(5))
///         .build()
///         .await?;
///
///     client.identify("user_42")
///         .attribute("plan", "pro")
///         .send()
///         .await?;
///
///     client.track("purchase")
///         .attribute("price", 9.99)
///         .send()
///         .await?;
///
///     let title = client.get_string("welcome_title", "Welcome");
///     println!("{}", title);
///
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Liquid {
    config: Config,
    tasks: mpsc::Sender<Task>,
    values: Arc<ArcSwap<ValueSnapshot>>,
    notifier: Notifier,
    is_shutdown: AtomicBool,
    lane_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Liquid {
    /// Create a new builder with the given API token.
    pub fn builder(api_token: impl Into<String>) -> LiquidBuilder {
        LiquidBuilder::new(api_token)
    }

    /// Load persisted state and start the background worker.
    pub(crate) async fn from_builder(builder: LiquidBuilder) -> Result<Self, Error> {
        let config = builder.build_config()?;

        let transport: Arc<dyn Transport> = match builder.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        let storage = builder.storage.unwrap_or_else(default_storage);
        let notifier = Notifier::new(
            builder
                .dispatcher
                .unwrap_or_else(|| Arc::new(InlineDispatcher)),
        );
        let values = Arc::new(ArcSwap::from_pointee(ValueSnapshot::default()));

        let lane = Lane::load(LaneParts {
            store: SnapshotStore::new(storage, config.api_token()),
            courier: Courier::new(transport, config.api_token()),
            connectivity: builder
                .connectivity
                .unwrap_or_else(|| Arc::new(AlwaysOnline)),
            notifier: notifier.clone(),
            published: values.clone(),
            device: builder.device,
            config: config.clone(),
        })
        .await;

        let (tasks, receiver) = mpsc::channel(TASK_BUFFER);
        let handle = tokio::spawn(lane.run(receiver));
        info!(api_host = %config.api_host(), "liquid client started");

        Ok(Self {
            config,
            tasks,
            values,
            notifier,
            is_shutdown: AtomicBool::new(false),
            lane_handle: Mutex::new(Some(handle)),
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ============================================
    // TRACK
    // ============================================

    /// Track an event.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use liquid::Liquid;
    /// # async fn example(client: &Liquid) -> Result<(), liquid::Error> {
    /// client.track("level_completed")
    ///     .attribute("level", 3)
    ///     .send()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn track(&self, event_name: impl Into<String>) -> SendableTrack<'_> {
        SendableTrack {
            builder: TrackBuilder::new(event_name),
            client: self,
        }
    }

    // ============================================
    // IDENTIFY
    // ============================================

    /// Identify the current user.
    ///
    /// Switching to a new identifier ends the current session and starts a
    /// new one. If the previous user was anonymous, the two ids are aliased
    /// on the server unless [`SendableIdentify::alias`] turns that off.
    /// Identifying the current user again only merges attributes.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use liquid::Liquid;
    /// # async fn example(client: &Liquid) -> Result<(), liquid::Error> {
    /// client.identify("user_42")
    ///     .attribute("age", 31)
    ///     .send()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn identify(&self, user_id: impl Into<String>) -> SendableIdentify<'_> {
        SendableIdentify {
            builder: IdentifyBuilder::new(user_id),
            client: self,
        }
    }

    /// Forget the identified user. An anonymous user keeps its id and only
    /// loses its attributes.
    pub async fn reset_user(&self) -> Result<(), Error> {
        self.submit(Task::ResetUser).await
    }

    /// Set one attribute on the current user.
    pub async fn set_attribute(
        &self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), Error> {
        self.set_attributes(Attributes::from([(key.into(), value.into())]))
            .await
    }

    /// Set several attributes on the current user.
    pub async fn set_attributes(&self, attributes: Attributes) -> Result<(), Error> {
        self.ensure_not_shutdown()?;
        let attributes = attributes::sanitize_map(attributes, self.config.development_mode())?;
        if attributes.is_empty() {
            return Ok(());
        }
        self.submit(Task::SetAttributes { attributes }).await
    }

    /// Attach a location to the device. `None` clears it.
    pub async fn set_location(&self, location: Option<(f64, f64)>) -> Result<(), Error> {
        self.submit(Task::SetLocation { location }).await
    }

    // ============================================
    // VALUES
    // ============================================

    /// Read a remote variable, or `fallback` if it isn't loaded.
    ///
    /// A loaded value of the wrong type is discarded in the background, along
    /// with the rest of its target group, and fetched again.
    pub fn get_variable<T: VariableType>(&self, name: &str, fallback: T) -> T {
        if self.config.development_mode() {
            let payload = discovery_payload(name, &fallback);
            self.try_submit(Task::DiscoverVariable { payload });
        }

        let lookup = self.values.load().lookup::<T>(name);
        match lookup {
            Lookup::Found(value) => value,
            Lookup::Missing => fallback,
            Lookup::Mismatch => {
                warn!(variable = %name, data_type = ?T::DATA_TYPE, "loaded value has the wrong type");
                self.try_submit(Task::Invalidate {
                    name: name.to_string(),
                });
                fallback
            }
        }
    }

    pub fn get_string(&self, name: &str, fallback: impl Into<String>) -> String {
        self.get_variable(name, fallback.into())
    }

    pub fn get_int(&self, name: &str, fallback: i64) -> i64 {
        self.get_variable(name, fallback)
    }

    pub fn get_float(&self, name: &str, fallback: f64) -> f64 {
        self.get_variable(name, fallback)
    }

    pub fn get_bool(&self, name: &str, fallback: bool) -> bool {
        self.get_variable(name, fallback)
    }

    pub fn get_datetime(&self, name: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.get_variable(name, fallback)
    }

    pub fn get_color(&self, name: &str, fallback: Color) -> Color {
        self.get_variable(name, fallback)
    }

    /// The values currently visible to the getters.
    pub fn loaded_values(&self) -> Arc<ValueSnapshot> {
        self.values.load_full()
    }

    /// Fetch values from the server.
    pub async fn request_values(&self) -> Result<(), Error> {
        self.submit(Task::RequestValues).await
    }

    /// Make the last fetched values visible to the getters.
    pub async fn load_values(&self) -> Result<(), Error> {
        self.submit(Task::LoadValues).await
    }

    /// Attach a listener for value notifications.
    pub fn attach_listener(&self, listener: Arc<dyn ValuesListener>) -> ListenerId {
        self.notifier.attach(listener)
    }

    /// Detach a listener. Returns false if it wasn't attached.
    pub fn detach_listener(&self, id: ListenerId) -> bool {
        self.notifier.detach(id)
    }

    // ============================================
    // SESSION
    // ============================================

    /// The app came to foreground.
    pub async fn on_app_foregrounded(&self) -> Result<(), Error> {
        self.submit(Task::Foregrounded).await
    }

    /// The app went to background. Pending requests are flushed.
    pub async fn on_app_backgrounded(&self) -> Result<(), Error> {
        self.submit(Task::Backgrounded).await
    }

    /// End the current session and start a new one.
    pub async fn close_session(&self) -> Result<(), Error> {
        self.submit(Task::CloseSession).await
    }

    // ============================================
    // QUERIES
    // ============================================

    /// The current user, after every previously submitted call was applied.
    pub async fn user(&self) -> Result<Option<User>, Error> {
        self.query(|reply| Task::User { reply }).await
    }

    /// The current session, after every previously submitted call was applied.
    pub async fn session(&self) -> Result<Option<Session>, Error> {
        self.query(|reply| Task::Session { reply }).await
    }

    /// Requests waiting to be delivered.
    pub async fn pending_requests(&self) -> Result<Vec<Request>, Error> {
        self.query(|reply| Task::PendingRequests { reply }).await
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Ask the worker to deliver pending requests. Returns once the flush is
    /// scheduled, not when it completes.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), Error> {
        self.submit(Task::Flush).await
    }

    /// Change the periodic flush interval. Zero stops the periodic flush.
    pub async fn set_flush_interval(&self, interval: Duration) -> Result<(), Error> {
        self.submit(Task::SetFlushInterval { interval }).await
    }

    /// Clear the user, values and device location, and start over in a new
    /// session. Pending requests are dropped unless the
    /// [`ResetPolicy`](crate::ResetPolicy) preserves them.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<(), Error> {
        self.submit(Task::Reset { soft: false }).await
    }

    /// Like [`reset`](Self::reset) but always keeps pending requests.
    #[instrument(skip(self))]
    pub async fn soft_reset(&self) -> Result<(), Error> {
        self.submit(Task::Reset { soft: true }).await
    }

    /// Shutdown the client gracefully.
    ///
    /// Stops the flush timer, makes a final delivery attempt and stops the
    /// worker. Requests that could not be delivered stay persisted for the
    /// next start.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<FlushReport, Error> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(FlushReport::default()); // Already shutdown
        }

        info!("shutting down client");

        let (reply, response) = oneshot::channel();
        let report = match self.tasks.send(Task::Shutdown { reply }).await {
            Ok(()) => response.await.unwrap_or_default(),
            Err(_) => FlushReport::default(),
        };

        if let Some(handle) = self.lane_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }

        Ok(report)
    }

    // ============================================
    // INTERNAL
    // ============================================

    fn ensure_not_shutdown(&self) -> Result<(), Error> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    async fn submit(&self, task: Task) -> Result<(), Error> {
        self.ensure_not_shutdown()?;
        self.tasks.send(task).await.map_err(|_| Error::Shutdown)
    }

    /// Submit without waiting; for synchronous callers.
    fn try_submit(&self, task: Task) {
        if self.ensure_not_shutdown().is_err() {
            return;
        }
        if let Err(e) = self.tasks.try_send(task) {
            debug!(error = %e, "worker busy, dropping background task");
        }
    }

    async fn query<T>(&self, task: impl FnOnce(oneshot::Sender<T>) -> Task) -> Result<T, Error> {
        let (reply, response) = oneshot::channel();
        self.submit(task(reply)).await?;
        response.await.map_err(|_| Error::Shutdown)
    }
}

impl LiquidBuilder {
    /// Build the Liquid client.
    ///
    /// Must be called within a tokio runtime.
    pub async fn build(self) -> Result<Liquid, Error> {
        Liquid::from_builder(self).await
    }
}

// ============================================
// SENDABLE WRAPPERS
// ============================================

/// Sendable track builder.
pub struct SendableTrack<'a> {
    builder: TrackBuilder,
    client: &'a Liquid,
}

impl<'a> SendableTrack<'a> {
    /// Add an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.builder = self.builder.attribute(key, value);
        self
    }

    /// Add an attribute from arbitrary JSON. Arrays and objects are rejected.
    pub fn json_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.builder = self.builder.json_attribute(key, value);
        self
    }

    /// Send the event.
    pub async fn send(self) -> Result<(), Error> {
        self.client.ensure_not_shutdown()?;
        match self.builder.build(self.client.config.development_mode())? {
            Some(task) => self.client.submit(task).await,
            None => Ok(()),
        }
    }
}

/// Sendable identify builder.
pub struct SendableIdentify<'a> {
    builder: IdentifyBuilder,
    client: &'a Liquid,
}

impl<'a> SendableIdentify<'a> {
    /// Add a user attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.builder = self.builder.attribute(key, value);
        self
    }

    /// Add a user attribute from arbitrary JSON. Arrays and objects are rejected.
    pub fn json_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.builder = self.builder.json_attribute(key, value);
        self
    }

    /// Whether to alias the previous anonymous user. Defaults to true.
    pub fn alias(mut self, alias: bool) -> Self {
        self.builder = self.builder.alias(alias);
        self
    }

    /// Send the identify call.
    pub async fn send(self) -> Result<(), Error> {
        self.client.ensure_not_shutdown()?;
        match self.builder.build(self.client.config.development_mode())? {
            Some(task) => self.client.submit(task).await,
            None => Ok(()),
        }
    }
}
