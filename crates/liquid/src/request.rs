//! Pending network calls and the endpoints they target.

use crate::types::{AliasPayload, DataPoint, VariablePayload};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failed deliveries after which a request is dropped.
pub const MAX_TRIES: u32 = 10;

/// Minimum wait before retrying a request that failed for a non-auth reason.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// One pending call to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    url: String,
    method: Method,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attempts: u32,
    #[serde(default)]
    last_attempt_at: Option<DateTime<Utc>>,
}

impl Request {
    pub fn new(url: impl Into<String>, method: Method, body: Option<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Number of failed deliveries so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time of the last failure that started a cooldown.
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    /// Whether the cooldown since the last failed attempt has elapsed.
    pub fn can_send(&self, now: DateTime<Utc>) -> bool {
        match self.last_attempt_at {
            None => true,
            Some(last) => {
                now.signed_duration_since(last).num_milliseconds()
                    >= RETRY_COOLDOWN.as_millis() as i64
            }
        }
    }

    /// Count a failed delivery. Auth failures are retried on the next flush,
    /// so they don't start a cooldown.
    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>, auth_failure: bool) {
        self.attempts += 1;
        if !auth_failure {
            self.last_attempt_at = Some(now);
        }
    }

    /// Whether the attempt budget is spent.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.attempts >= MAX_TRIES
    }

    #[cfg(test)]
    pub(crate) fn with_last_attempt(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }
}

/// Builds requests against the configured API host.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    base: String,
}

impl Endpoints {
    pub(crate) fn new(api_host: impl Into<String>) -> Self {
        Self {
            base: api_host.into(),
        }
    }

    fn url(&self, segments: &[&str]) -> String {
        match reqwest::Url::parse(&self.base) {
            Ok(mut url) => {
                if let Ok(mut path) = url.path_segments_mut() {
                    path.pop_if_empty().extend(segments);
                }
                url.to_string()
            }
            Err(_) => format!("{}/{}", self.base, segments.join("/")),
        }
    }

    pub(crate) fn data_point(&self, point: &DataPoint<'_>) -> Result<Request, Error> {
        let body = serde_json::to_string(point)?;
        Ok(Request::new(self.url(&["data_points"]), Method::Post, Some(body)))
    }

    pub(crate) fn alias(&self, previous_id: &str, new_id: &str) -> Result<Request, Error> {
        let body = serde_json::to_string(&AliasPayload {
            unique_id: new_id,
            unique_id_alias: previous_id,
        })?;
        Ok(Request::new(self.url(&["aliases"]), Method::Post, Some(body)))
    }

    pub(crate) fn liquid_package(&self, user_id: &str, device_id: &str) -> Request {
        let url = self.url(&["users", user_id, "devices", device_id, "liquid_package"]);
        Request::new(url, Method::Get, None)
    }

    pub(crate) fn variable(&self, payload: &VariablePayload) -> Result<Request, Error> {
        let body = serde_json::to_string(payload)?;
        Ok(Request::new(self.url(&["variables"]), Method::Post, Some(body)))
    }
}
