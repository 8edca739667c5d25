//! Liquid analytics and remote-values SDK for Rust.
//!
//! Tracks users, sessions and events, delivers them through a durable retry
//! queue, and serves remote variable values from a local cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use liquid::{DeviceInfo, Liquid};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), liquid::Error> {
//!     let client = Liquid::builder("tok_xxx")
//!         .storage_dir("/var/lib/my-app/liquid")
//!         .device(DeviceInfo {
//!             platform: "Linux".into(),
//!             app_name: "my-app".into(),
//!             ..Default::default()
//!         })
//!         .auto_load_values(true)
//!         .build()
//!         .await?;
//!
//!     client.track("app_opened").send().await?;
//!     let limit = client.get_int("daily_limit", 10);
//!
//!     client.on_app_backgrounded().await?;
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod attributes;
mod builders;
mod client;
mod clock;
mod config;
mod device;
mod error;
mod event;
mod identity;
mod lane;
mod notify;
mod queue;
mod request;
mod session;
mod storage;
mod timer;
mod transport;
mod types;
mod user;
mod values;

pub use attributes::{AttributeValue, Attributes};
pub use builders::{IdentifyBuilder, TrackBuilder};
pub use client::{Liquid, SendableIdentify, SendableTrack};
pub use config::{
    Config, LiquidBuilder, ResetPolicy, DEFAULT_API_HOST, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SESSION_TIMEOUT, DEFAULT_TIMEOUT,
};
pub use device::{DeviceInfo, SDK_VERSION};
pub use error::Error;
pub use event::UNNAMED_EVENT;
pub use notify::{Dispatcher, InlineDispatcher, ListenerId, ValuesListener};
pub use queue::FlushReport;
pub use request::{Method, Request, MAX_TRIES, RETRY_COOLDOWN};
pub use session::Session;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use transport::{AlwaysOnline, Connectivity, Headers, HttpTransport, Response, Transport};
pub use user::User;
pub use values::{
    Color, DataType, LiquidPackage, ParseColorError, Value, ValueSnapshot, Variable, VariableType,
};
