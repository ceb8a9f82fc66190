//! Runtime identity for one connected device.
//!
//! Distinct from [`crate::device_id::DeviceId`] (vendor_id, product_id),
//! which identifies a *configuration match*: two controllers of the
//! same model share a `DeviceId` but need independent `SessionId`s so
//! their mirrored state and held keys don't collide.

use std::fmt;

/// Opaque per-connection identity, typically `vendor:product:serial`
/// or `vendor:product:bus-path` when no serial is available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
