//! Description of the device the SDK runs on.

use crate::attributes::{AttributeValue, Attributes};
use serde::Serialize;

/// SDK version reported with every data point.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Platform details supplied by the host application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub platform: String,
    pub vendor: String,
    pub model: String,
    pub system_version: String,
    pub app_bundle: String,
    pub app_name: String,
    pub app_version: String,
    pub release_version: String,
}

/// The device as reported to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    #[serde(flatten)]
    attributes: Attributes,
    unique_id: String,
    platform: String,
    #[serde(rename = "_vendor")]
    vendor: String,
    #[serde(rename = "_deviceModel")]
    model: String,
    #[serde(rename = "_systemVersion")]
    system_version: String,
    #[serde(rename = "_appBundle")]
    app_bundle: String,
    #[serde(rename = "_appName")]
    app_name: String,
    #[serde(rename = "_appVersion")]
    app_version: String,
    #[serde(rename = "_releaseVersion")]
    release_version: String,
    #[serde(rename = "_sdkVersion")]
    sdk_version: &'static str,
}

impl Device {
    pub(crate) fn new(unique_id: impl Into<String>, info: DeviceInfo) -> Self {
        Self {
            attributes: Attributes::new(),
            unique_id: unique_id.into(),
            platform: info.platform,
            vendor: info.vendor,
            model: info.model,
            system_version: info.system_version,
            app_bundle: info.app_bundle,
            app_name: info.app_name,
            app_version: info.app_version,
            release_version: info.release_version,
            sdk_version: SDK_VERSION,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub(crate) fn set_location(&mut self, location: Option<(f64, f64)>) {
        match location {
            Some((latitude, longitude)) => {
                self.attributes
                    .insert("_latitude".into(), AttributeValue::from(latitude));
                self.attributes
                    .insert("_longitude".into(), AttributeValue::from(longitude));
            }
            None => {
                self.attributes.remove("_latitude");
                self.attributes.remove("_longitude");
            }
        }
    }
}

/// Generate a device identifier.
pub(crate) fn new_device_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
