//! Fluent builders for tracked events and identify calls.
//!
//! Builders only collect input. Validation runs when the call is sent, on the
//! caller's side, so development mode errors come back from `send()`.

use crate::attributes::{self, AttributeValue, RawValue};
use crate::event;
use crate::lane::Task;
use crate::Error;
use tracing::warn;

// ============================================
// TRACK BUILDER
// ============================================

/// Builder for a host event.
#[derive(Debug)]
pub struct TrackBuilder {
    name: String,
    attributes: Vec<(String, RawValue)>,
}

impl TrackBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .push((key.into(), RawValue::Scalar(value.into())));
        self
    }

    /// Add an attribute from arbitrary JSON. Arrays and objects are rejected.
    pub fn json_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.push((key.into(), RawValue::Json(value.into())));
        self
    }

    /// Validate into a lane task. `None` when the event was dropped.
    pub(crate) fn build(self, development_mode: bool) -> Result<Option<Task>, Error> {
        if !event::validate_name(&self.name, development_mode)? {
            return Ok(None);
        }
        let attributes = attributes::sanitize(self.attributes, development_mode)?;
        Ok(Some(Task::Track {
            name: self.name,
            attributes,
        }))
    }
}

// ============================================
// IDENTIFY BUILDER
// ============================================

/// Builder for an identify call.
#[derive(Debug)]
pub struct IdentifyBuilder {
    id: String,
    attributes: Vec<(String, RawValue)>,
    alias: bool,
}

impl IdentifyBuilder {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
            alias: true,
        }
    }

    /// Add a user attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .push((key.into(), RawValue::Scalar(value.into())));
        self
    }

    /// Add a user attribute from arbitrary JSON. Arrays and objects are rejected.
    pub fn json_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.push((key.into(), RawValue::Json(value.into())));
        self
    }

    /// Whether to link the previous anonymous user to this one. Defaults to
    /// true.
    pub fn alias(mut self, alias: bool) -> Self {
        self.alias = alias;
        self
    }

    pub(crate) fn build(self, development_mode: bool) -> Result<Option<Task>, Error> {
        if self.id.is_empty() {
            let err = Error::InvalidIdentifier("identifier can't be empty".into());
            if development_mode {
                return Err(err);
            }
            warn!(error = %err, "ignoring identify call");
            return Ok(None);
        }
        let attributes = attributes::sanitize(self.attributes, development_mode)?;
        Ok(Some(Task::Identify {
            id: self.id,
            attributes,
            alias: self.alias,
        }))
    }
}
