//! HTTP transport for delivering requests.
//!
//! The core never talks to the network directly: it hands each request to a
//! [`Transport`] and classifies the returned status. Reachability is asked of
//! a [`Connectivity`] probe before any network work is attempted.

use crate::config::Config;
use crate::device::SDK_VERSION;
use crate::request::{Method, Request};
use crate::Error;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Content type negotiated with the collection API.
pub const ACCEPT: &str = "application/vnd.lqd.v1+json";

/// Request headers as name/value pairs.
pub type Headers = Vec<(&'static str, String)>;

/// Outcome of one HTTP exchange that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Option<String>,
}

impl Response {
    pub fn new(status: u16, body: Option<String>) -> Self {
        Self { status, body }
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 or 403.
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Performs HTTP exchanges on behalf of the SDK.
///
/// `Err` means no response was received at all (connection refused, timeout,
/// DNS). Any status code, including 4xx and 5xx, is an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&str>,
    ) -> Result<Response, Error>;
}

/// Answers whether the network is currently reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity probe for hosts without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the configured request timeout.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(format!("liquid-rust/{}", SDK_VERSION))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&str>,
    ) -> Result<Response, Error> {
        let mut builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        for (name, value) in headers {
            // reqwest negotiates and decodes compression itself
            if name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            builder = builder.header(*name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.ok().filter(|b| !b.is_empty());

        Ok(Response { status, body })
    }
}

/// Sends queued requests with the SDK's standard headers.
#[derive(Clone)]
pub(crate) struct Courier {
    transport: Arc<dyn Transport>,
    headers: Headers,
}

impl Courier {
    pub(crate) fn new(transport: Arc<dyn Transport>, api_token: &str) -> Self {
        Self {
            transport,
            headers: standard_headers(api_token),
        }
    }

    /// Send one request.
    pub(crate) async fn deliver(&self, request: &Request) -> Result<Response, Error> {
        debug!(method = ?request.method(), url = %request.url(), "sending request");

        let response = self
            .transport
            .send(request.method(), request.url(), &self.headers, request.body())
            .await?;

        if !response.is_success() {
            warn!(
                status = response.status,
                url = %request.url(),
                body = response.body.as_deref().unwrap_or(""),
                "request rejected"
            );
        }
        Ok(response)
    }
}

impl fmt::Debug for Courier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Courier").finish_non_exhaustive()
    }
}

fn standard_headers(api_token: &str) -> Headers {
    vec![
        ("Authorization", format!("Token {}", api_token)),
        ("Accept", ACCEPT.to_string()),
        ("Content-Type", "application/json".to_string()),
        ("Accept-Encoding", "gzip".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_headers() {
        let headers = standard_headers("tok_123");

        assert!(headers.contains(&("Authorization", "Token tok_123".to_string())));
        assert!(headers.contains(&("Accept", "application/vnd.lqd.v1+json".to_string())));
        assert!(headers.contains(&("Content-Type", "application/json".to_string())));
        assert!(headers.contains(&("Accept-Encoding", "gzip".to_string())));
    }

    #[test]
    fn test_status_classification() {
        assert!(Response::new(200, None).is_success());
        assert!(Response::new(204, None).is_success());
        assert!(!Response::new(422, None).is_success());

        assert!(Response::new(401, None).is_auth_failure());
        assert!(Response::new(403, None).is_auth_failure());
        assert!(!Response::new(500, None).is_auth_failure());
    }
}
