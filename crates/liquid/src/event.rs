//! Tracked events.

use crate::attributes::{self, Attributes};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name used when the host tracks an event without one.
pub const UNNAMED_EVENT: &str = "unnamedEvent";

pub(crate) const START_SESSION: &str = "_startSession";
pub(crate) const END_SESSION: &str = "_endSession";
pub(crate) const PAUSE_SESSION: &str = "_pauseSession";
pub(crate) const RESUME_SESSION: &str = "_resumeSession";

/// A named occurrence with attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(flatten)]
    attributes: Attributes,
    name: String,
    #[serde(rename = "date")]
    occurred_at: DateTime<Utc>,
}

impl Event {
    pub(crate) fn new(name: impl Into<String>, mut attributes: Attributes, occurred_at: DateTime<Utc>) -> Self {
        let name = name.into();
        // would collide with the flattened fields below
        attributes.remove("name");
        attributes.remove("date");
        Self {
            name: if name.is_empty() { UNNAMED_EVENT.into() } else { name },
            attributes,
            occurred_at,
        }
    }

    /// System events skip name validation.
    pub(crate) fn system(name: &str, occurred_at: DateTime<Utc>) -> Self {
        Self::new(name, Attributes::new(), occurred_at)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Check a host supplied event name. Names starting with `_` belong to the
/// SDK's own lifecycle events.
pub(crate) fn validate_name(name: &str, development_mode: bool) -> Result<bool, Error> {
    if name.starts_with('_') {
        attributes::reject(
            development_mode,
            Error::InvalidEventName(format!("'{}' can't begin with '_'", name)),
        )?;
        return Ok(false);
    }
    if attributes::has_invalid_chars(name) {
        attributes::reject(
            development_mode,
            Error::InvalidEventName(format!("'{}' contains invalid chars (. $ \\0)", name)),
        )?;
        return Ok(false);
    }
    Ok(true)
}
