//! Target device identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// MSI USB Vendor ID
pub const MSI_VENDOR_ID: u16 = 0x1462;
/// Product ID of the monitor's HID control interface
pub const MONITOR_PRODUCT_ID: u16 = 0x3FA4;
/// Declared report size of the control interface
pub const REPORT_SIZE: usize = 0x40;

/// Vendor/product pair selecting the monitor's HID controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    #[must_use]
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }

    /// Check whether a device's identifiers satisfy this filter.
    #[must_use]
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(MSI_VENDOR_ID, MONITOR_PRODUCT_ID)
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_msi_monitor() {
        let filter = DeviceFilter::default();

        assert_eq!(filter.vendor_id, 0x1462);
        assert_eq!(filter.product_id, 0x3FA4);
        assert_eq!(REPORT_SIZE, 64);
    }

    #[test]
    fn test_filter_matches_exact_pair_only() {
        let filter = DeviceFilter::default();

        assert!(filter.matches(0x1462, 0x3FA4));
        assert!(!filter.matches(0x1462, 0x3FA5));
        assert!(!filter.matches(0x0FD9, 0x3FA4));
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(DeviceFilter::default().to_string(), "1462:3fa4");
        assert_eq!(DeviceFilter::new(0x0fd9, 0x70).to_string(), "0fd9:0070");
    }
}
