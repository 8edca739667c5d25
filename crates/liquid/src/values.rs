//! Remote values ("liquid package") and the local cache of them.
//!
//! The lane owns the [`ValueCache`]; readers on other threads only ever see
//! immutable [`ValueSnapshot`]s published through an `ArcSwap`.

use crate::types::VariablePayload;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Declared type of a remote variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    #[serde(rename = "integer")]
    Int,
    Float,
    #[serde(rename = "boolean")]
    Bool,
    #[serde(rename = "datetime")]
    DateTime,
    Color,
}

/// Variable metadata attached to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
}

/// One remote value, optionally scoped to a targeting segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    id: String,
    value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
    variable: Variable,
}

impl Value {
    pub fn new(
        id: impl Into<String>,
        variable: Variable,
        value: serde_json::Value,
        target_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            value,
            target_id,
            variable,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn name(&self) -> &str {
        &self.variable.name
    }

    pub fn data_type(&self) -> DataType {
        self.variable.data_type
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }
}

/// The server's bundle of values, as returned by the liquid package endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidPackage {
    #[serde(default)]
    values: Vec<Value>,
}

impl LiquidPackage {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Parse a server response. Individual malformed values are skipped.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        #[derive(Deserialize)]
        struct Raw {
            values: Vec<serde_json::Value>,
        }

        let raw: Raw = serde_json::from_str(body)?;
        let values = raw
            .values
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<Value>(v) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "skipping malformed value");
                    None
                }
            })
            .collect();
        Ok(Self { values })
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Lane-owned cache of the most recent package.
#[derive(Debug, Default)]
pub(crate) struct ValueCache {
    package: LiquidPackage,
}

impl ValueCache {
    pub(crate) fn new(package: LiquidPackage) -> Self {
        Self { package }
    }

    /// Replace everything with a freshly fetched package.
    pub(crate) fn replace(&mut self, package: LiquidPackage) {
        self.package = package;
    }

    pub(crate) fn clear(&mut self) {
        self.package = LiquidPackage::default();
    }

    pub(crate) fn package(&self) -> &LiquidPackage {
        &self.package
    }

    /// Drop the value named `name`. A value scoped to a target takes every
    /// other value of that target with it. Returns whether anything changed.
    pub(crate) fn invalidate(&mut self, name: &str) -> bool {
        let target = match self.package.values.iter().find(|v| v.name() == name) {
            Some(value) => value.target_id.clone(),
            None => return false,
        };

        let before = self.package.values.len();
        match target {
            Some(target_id) => self
                .package
                .values
                .retain(|v| v.target_id.as_deref() != Some(target_id.as_str())),
            None => self.package.values.retain(|v| v.name() != name),
        }
        self.package.values.len() != before
    }

    pub(crate) fn snapshot(&self) -> ValueSnapshot {
        ValueSnapshot::from_package(&self.package)
    }
}

/// Read-only view of loaded values, keyed by variable name.
#[derive(Debug, Clone, Default)]
pub struct ValueSnapshot {
    values: Vec<Value>,
    by_name: HashMap<String, usize>,
}

impl ValueSnapshot {
    pub(crate) fn from_package(package: &LiquidPackage) -> Self {
        let values = package.values.clone();
        let by_name = values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.value.is_null())
            .map(|(i, v)| (v.name().to_string(), i))
            .collect();
        Self { values, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.by_name.get(name).map(|&i| &self.values[i])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Look up `name` as a `T`.
    pub(crate) fn lookup<T: VariableType>(&self, name: &str) -> Lookup<T> {
        let Some(value) = self.get(name) else {
            return Lookup::Missing;
        };
        if value.data_type() != T::DATA_TYPE {
            return Lookup::Mismatch;
        }
        match T::from_json(&value.value) {
            Some(v) => Lookup::Found(v),
            None => {
                warn!(variable = %name, data_type = ?T::DATA_TYPE, "could not parse value");
                Lookup::Mismatch
            }
        }
    }
}

/// Outcome of a typed lookup.
#[derive(Debug, PartialEq)]
pub(crate) enum Lookup<T> {
    Found(T),
    Missing,
    /// Present but not usable as the requested type.
    Mismatch,
}

/// Rust types a remote variable can be read as.
pub trait VariableType: Sized {
    const DATA_TYPE: DataType;

    fn from_json(value: &serde_json::Value) -> Option<Self>;

    /// How the fallback is reported in development mode.
    fn to_json(&self) -> serde_json::Value;
}

impl VariableType for String {
    const DATA_TYPE: DataType = DataType::String;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.clone())
    }
}

impl VariableType for i64 {
    const DATA_TYPE: DataType = DataType::Int;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(*self)
    }
}

impl VariableType for f64 {
    const DATA_TYPE: DataType = DataType::Float;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(*self)
    }
}

impl VariableType for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Bool(*self)
    }
}

impl VariableType for DateTime<Utc> {
    const DATA_TYPE: DataType = DataType::DateTime;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.to_rfc3339())
    }
}

impl VariableType for Color {
    const DATA_TYPE: DataType = DataType::Color;

    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_str().and_then(|s| s.parse().ok())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.to_string())
    }
}

/// Discovery payload for a requested variable.
pub(crate) fn discovery_payload<T: VariableType>(name: &str, fallback: &T) -> VariablePayload {
    VariablePayload {
        name: name.to_string(),
        data_type: T::DATA_TYPE,
        default_value: fallback.to_json(),
    }
}

/// An ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }
}

/// Error parsing a [`Color`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected #RRGGBB or #AARRGGBB, got '{0}'")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    /// Accepts `#RRGGBB` (opaque) and `#AARRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(err)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let n = u32::from_str_radix(hex, 16).map_err(|_| err())?;
        match hex.len() {
            6 => Ok(Color(0xFF00_0000 | n)),
            8 => Ok(Color(n)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha() == 0xFF {
            write!(f, "#{:06X}", self.0 & 0x00FF_FFFF)
        } else {
            write!(f, "#{:08X}", self.0)
        }
    }
}
