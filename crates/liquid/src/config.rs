//! Client configuration.

use crate::device::DeviceInfo;
use crate::notify::Dispatcher;
use crate::storage::{FileStorage, Storage};
use crate::transport::{Connectivity, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default API host.
pub const DEFAULT_API_HOST: &str = "https://api.lqd.io/collect";

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Default session timeout.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on pending requests.
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a hard [`reset`](crate::Liquid::reset) does with requests that were
/// not delivered yet. A soft reset always keeps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Drop every pending request.
    #[default]
    ClearQueue,
    /// Keep pending requests, like a soft reset.
    PreserveQueue,
}

/// Liquid client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) api_token: String,
    pub(crate) api_host: String,
    pub(crate) flush_interval: Duration,
    pub(crate) session_timeout: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) timeout: Duration,
    pub(crate) development_mode: bool,
    pub(crate) auto_load_values: bool,
    pub(crate) reset_policy: ResetPolicy,
}

impl Config {
    /// Get the API token.
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Get the API host.
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Get the flush interval. Zero means the periodic flush is disabled.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Get the session timeout.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Get the maximum number of pending requests.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether development mode is on.
    pub fn development_mode(&self) -> bool {
        self.development_mode
    }

    /// Whether fetched values are published to readers as soon as they arrive.
    pub fn auto_load_values(&self) -> bool {
        self.auto_load_values
    }

    /// Get the hard reset policy.
    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }
}

/// Builder for the [`Liquid`](crate::Liquid) client.
pub struct LiquidBuilder {
    api_token: String,
    api_host: Option<String>,
    flush_interval: Option<Duration>,
    session_timeout: Option<Duration>,
    queue_capacity: Option<usize>,
    timeout: Option<Duration>,
    development_mode: bool,
    auto_load_values: bool,
    reset_policy: ResetPolicy,
    pub(crate) storage: Option<Arc<dyn Storage>>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) connectivity: Option<Arc<dyn Connectivity>>,
    pub(crate) dispatcher: Option<Arc<dyn Dispatcher>>,
    pub(crate) device: DeviceInfo,
}

impl LiquidBuilder {
    /// Create a new builder with the given API token.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            api_host: None,
            flush_interval: None,
            session_timeout: None,
            queue_capacity: None,
            timeout: None,
            development_mode: false,
            auto_load_values: false,
            reset_policy: ResetPolicy::default(),
            storage: None,
            transport: None,
            connectivity: None,
            dispatcher: None,
            device: DeviceInfo::default(),
        }
    }

    /// Set the API host.
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Set the flush interval. `Duration::ZERO` turns the periodic flush off.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Set how long the app may stay in background before its session ends.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of pending requests.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail loudly on invalid input and report requested variables.
    pub fn development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Publish fetched values to readers as soon as they arrive.
    pub fn auto_load_values(mut self, enabled: bool) -> Self {
        self.auto_load_values = enabled;
        self
    }

    /// Choose what a hard reset does with pending requests.
    pub fn reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    /// Persist state through a custom backend.
    ///
    /// Defaults to files under the platform's local data directory. Pass a
    /// [`MemoryStorage`](crate::MemoryStorage) to keep nothing across restarts.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Persist state as files under `dir`.
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.storage(Arc::new(FileStorage::new(dir)))
    }

    /// Send requests through a custom transport instead of `reqwest`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Ask a custom probe whether the network is reachable.
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Run listener callbacks through a custom dispatcher.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Describe the device and app reported with every event.
    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Build the configuration.
    pub(crate) fn build_config(&self) -> Result<Config, crate::Error> {
        if self.api_token.is_empty() {
            return Err(crate::Error::Config("api_token cannot be empty".into()));
        }

        let api_host = self.api_host.as_deref().unwrap_or(DEFAULT_API_HOST);
        let api_host = api_host.trim_end_matches('/').to_string();
        if let Err(e) = reqwest::Url::parse(&api_host) {
            return Err(crate::Error::Config(format!(
                "api_host '{}' is not a valid URL: {}",
                api_host, e
            )));
        }

        let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(crate::Error::Config("queue_capacity must be positive".into()));
        }

        Ok(Config {
            api_token: self.api_token.clone(),
            api_host,
            flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            queue_capacity,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            development_mode: self.development_mode,
            auto_load_values: self.auto_load_values,
            reset_policy: self.reset_policy,
        })
    }
}

impl std::fmt::Debug for LiquidBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidBuilder")
            .field("api_host", &self.api_host)
            .field("development_mode", &self.development_mode)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
