//! The user events are attributed to.

use crate::attributes::{AttributeValue, Attributes};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Keys owned by the user record itself.
const RESERVED_KEYS: [&str; 2] = ["unique_id", "identified"];

/// A tracked user, either identified by the host app or anonymous.
///
/// Serialized flat: custom attributes sit next to `unique_id` and
/// `identified`, both on the wire and in local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "unique_id")]
    identifier: String,
    identified: bool,
    #[serde(flatten)]
    attributes: Attributes,
}

impl User {
    pub fn new(identifier: impl Into<String>, attributes: Attributes, identified: bool) -> Self {
        let mut user = Self {
            identifier: identifier.into(),
            identified,
            attributes: Attributes::new(),
        };
        user.merge_attributes(attributes);
        user
    }

    /// A fresh anonymous user with a generated identifier.
    pub fn anonymous() -> Self {
        Self::new(new_identifier(), Attributes::new(), false)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the host app identified this user explicitly.
    pub fn is_identified(&self) -> bool {
        self.identified
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub(crate) fn set_attribute(&mut self, key: String, value: AttributeValue) {
        if RESERVED_KEYS.contains(&key.as_str()) {
            warn!(key = %key, "ignoring reserved user attribute");
            return;
        }
        self.attributes.insert(key, value);
    }

    pub(crate) fn merge_attributes(&mut self, attributes: Attributes) {
        for (key, value) in attributes {
            self.set_attribute(key, value);
        }
    }

    pub(crate) fn clear_custom_attributes(&mut self) {
        self.attributes.clear();
    }
}

/// Generate an identifier for an anonymous user.
pub(crate) fn new_identifier() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_users_get_distinct_ids() {
        let a = User::anonymous();
        let b = User::anonymous();
        assert!(!a.is_identified());
        assert_ne!(a.identifier(), b.identifier());
    }

    #[test]
    fn test_reserved_keys_are_ignored() {
        let mut user = User::new("u1", Attributes::new(), true);
        user.set_attribute("unique_id".into(), "hijack".into());
        user.set_attribute("age".into(), 30.into());

        assert_eq!(user.identifier(), "u1");
        assert_eq!(user.attributes().len(), 1);
    }

    #[test]
    fn test_flat_json_shape() {
        let mut user = User::new("u1", Attributes::new(), true);
        user.set_attribute("plan".into(), "pro".into());

        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(json["unique_id"], "u1");
        assert_eq!(json["identified"], true);
        assert_eq!(json["plan"], "pro");
    }

    #[test]
    fn test_storage_roundtrip() {
        let mut user = User::new("u1", Attributes::new(), false);
        user.set_attribute("age".into(), 30.into());

        let text = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&text).unwrap();

        assert_eq!(back, user);
    }
}
