//! Vendor/product identity used to match a physical device to a
//! configuration, and distinct from the runtime `SessionId` that keys
//! per-connection state (see [`crate::session::SessionId`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A (vendor_id, product_id) pair. Hash/equal by both fields. On-disk
/// field names are `vendorId`/`productId` to match the configuration
/// shape in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceId {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_uppercase_zero_padded_hex() {
        let id = DeviceId::new(0x045e, 0x02ea);
        assert_eq!(id.to_string(), "045E:02EA");
    }

    #[test]
    fn equal_and_hash_by_both_fields() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(DeviceId::new(1, 2));
        assert!(set.contains(&DeviceId::new(1, 2)));
        assert!(!set.contains(&DeviceId::new(1, 3)));
    }
}
