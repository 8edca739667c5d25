//! Usage sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A usage session. Open while `ended_at` is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "unique_id")]
    id: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    /// Timeout in seconds.
    timeout: u64,
}

impl Session {
    pub(crate) fn open(started_at: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            // v7 ids sort by creation time
            id: Uuid::now_v7().simple().to_string(),
            started_at,
            ended_at: None,
            timeout: timeout.as_secs(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub(crate) fn close(&mut self, at: DateTime<Utc>) {
        if self.ended_at.is_none() {
            self.ended_at = Some(at);
        }
    }
}
