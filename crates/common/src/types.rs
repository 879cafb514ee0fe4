//! Identifier types for subscription bookkeeping.
//!
//! Both identifiers are opaque strings: subscription ids are chosen by the
//! client, user ids come from the authenticating gateway. The newtypes exist
//! so the two can never be swapped at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of an authenticated user (the owner of a subscription).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identity string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Client-supplied subscription identifier (registry primary key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wrap a subscription identifier string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a random identifier (for clients that do not bring their own).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("sub-{}", Uuid::new_v4()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let user = UserId::from("user-1");
        let sub = SubscriptionId::from("sub-1");

        assert_eq!(serde_json::to_string(&user).unwrap(), "\"user-1\"");
        assert_eq!(serde_json::to_string(&sub).unwrap(), "\"sub-1\"");

        let parsed: SubscriptionId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn test_generated_subscription_ids_are_unique() {
        let a = SubscriptionId::generate();
        let b = SubscriptionId::generate();

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sub-"));
    }

    #[test]
    fn test_display_matches_inner_value() {
        assert_eq!(UserId::new("alice").to_string(), "alice");
        assert_eq!(SubscriptionId::new("s-9").to_string(), "s-9");
    }
}
