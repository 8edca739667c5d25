//! Error types for the Liquid SDK.

/// Errors that can occur when using the Liquid SDK.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Client has been shutdown.
    #[error("Client has been shutdown")]
    Shutdown,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attribute key or value rejected (development mode only).
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Event name rejected (development mode only).
    #[error("Invalid event name: {0}")]
    InvalidEventName(String),

    /// User identifier rejected (development mode only).
    #[error("Invalid user identifier: {0}")]
    InvalidIdentifier(String),
}
