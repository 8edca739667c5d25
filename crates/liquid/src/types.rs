//! Wire payloads sent to the collection API.

use crate::device::Device;
use crate::event::Event;
use crate::session::Session;
use crate::user::User;
use crate::values::{DataType, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of `POST /data_points`.
#[derive(Debug, Clone, Serialize)]
pub struct DataPoint<'a> {
    pub user: &'a User,
    pub device: &'a Device,
    pub session: &'a Session,
    pub event: &'a Event,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValueRef<'a>>,
    pub timestamp: DateTime<Utc>,
}

/// A remote value the user was exposed to, as referenced by a data point.
#[derive(Debug, Clone, Serialize)]
pub struct ValueRef<'a> {
    pub id: &'a str,
    pub target_id: Option<&'a str>,
}

impl<'a> From<&'a Value> for ValueRef<'a> {
    fn from(value: &'a Value) -> Self {
        Self {
            id: value.id(),
            target_id: value.target_id(),
        }
    }
}

/// Body of `POST /aliases`.
#[derive(Debug, Clone, Serialize)]
pub struct AliasPayload<'a> {
    pub unique_id: &'a str,
    pub unique_id_alias: &'a str,
}

/// Body of `POST /variables`, sent in development mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariablePayload {
    pub name: String,
    pub data_type: DataType,
    pub default_value: serde_json::Value,
}
