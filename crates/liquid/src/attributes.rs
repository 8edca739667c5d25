//! Attribute values attached to users, events and devices.
//!
//! Keys may not contain `$`, `.` or NUL. Values are restricted to JSON
//! scalars plus timestamps. Violations are rejected per key: in development
//! mode the call fails, otherwise the offending key is dropped and logged.

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Attribute map.
pub type Attributes = HashMap<String, AttributeValue>;

/// A scalar attribute value.
///
/// Serialized as a plain JSON scalar; timestamps use RFC 3339. When read
/// back from JSON, strings that parse as RFC 3339 become timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Number(v.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Number(v.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Number(v.into())
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Number(v.into())
    }
}

/// Non-finite floats have no JSON form and become [`AttributeValue::Null`].
impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        serde_json::Number::from_f64(v)
            .map(AttributeValue::Number)
            .unwrap_or(AttributeValue::Null)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.into())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(v: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}

impl TryFrom<serde_json::Value> for AttributeValue {
    type Error = serde_json::Value;

    /// Arrays and objects are not scalars and are handed back unchanged.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Null => Ok(AttributeValue::Null),
            serde_json::Value::Bool(b) => Ok(AttributeValue::Bool(b)),
            serde_json::Value::Number(n) => Ok(AttributeValue::Number(n)),
            serde_json::Value::String(s) => Ok(AttributeValue::String(s)),
            other => Err(other),
        }
    }
}

/// An attribute as handed over by the host, before validation.
#[derive(Debug, Clone)]
pub(crate) enum RawValue {
    Scalar(AttributeValue),
    Json(serde_json::Value),
}

/// Whether `key` contains one of the reserved characters `$ . NUL`.
pub(crate) fn has_invalid_chars(key: &str) -> bool {
    key.contains('$') || key.contains('.') || key.contains('\0')
}

/// Reject or log, depending on development mode.
pub(crate) fn reject(development_mode: bool, err: Error) -> Result<(), Error> {
    if development_mode {
        return Err(err);
    }
    warn!(error = %err, "dropping invalid input");
    Ok(())
}

/// Validate a single key.
pub(crate) fn validate_key(key: &str, development_mode: bool) -> Result<bool, Error> {
    if has_invalid_chars(key) {
        reject(
            development_mode,
            Error::InvalidAttribute(format!("key '{}' contains invalid chars (. $ \\0)", key)),
        )?;
        return Ok(false);
    }
    Ok(true)
}

/// Validate every key and value, keeping the ones that pass.
pub(crate) fn sanitize(
    raw: impl IntoIterator<Item = (String, RawValue)>,
    development_mode: bool,
) -> Result<Attributes, Error> {
    let mut attributes = Attributes::new();
    for (key, value) in raw {
        if !validate_key(&key, development_mode)? {
            continue;
        }
        let value = match value {
            RawValue::Scalar(v) => v,
            RawValue::Json(json) => match AttributeValue::try_from(json) {
                Ok(v) => v,
                Err(rejected) => {
                    reject(
                        development_mode,
                        Error::InvalidAttribute(format!(
                            "value {} for key '{}' has unsupported type (string, number, bool, timestamp)",
                            rejected, key
                        )),
                    )?;
                    continue;
                }
            },
        };
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// Validate an already typed map; only keys can be wrong.
pub(crate) fn sanitize_map(attributes: Attributes, development_mode: bool) -> Result<Attributes, Error> {
    sanitize(
        attributes
            .into_iter()
            .map(|(k, v)| (k, RawValue::Scalar(v))),
        development_mode,
    )
}
