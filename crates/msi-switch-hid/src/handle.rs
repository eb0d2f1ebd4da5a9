//! Open device handles.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{HidError, HidResult};

/// Identity of a physically attached device.
///
/// Hot-plug notifications use the USB bus/address (`usb:003:012`), polling
/// uses the hidapi device path. Removal notifications are compared against
/// this value before the session drops its handle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity for a USB device at the given bus and address.
    #[must_use]
    pub fn usb(bus: u8, address: u8) -> Self {
        Self(format!("usb:{bus:03}:{address:03}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open connection to the monitor's HID controller.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceHandle: Send + Sync {
    /// Identity of the attachment this handle was opened for.
    fn id(&self) -> DeviceId;

    /// Short description for logs (product string, serial).
    fn describe(&self) -> String;

    /// Write an output report. The first byte is the report ID.
    ///
    /// # Errors
    /// Returns an error if the transport rejects the write.
    fn write_output(&self, report: &[u8]) -> HidResult<usize>;

    /// Read one input report, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    ///
    /// # Errors
    /// Returns an error if the device can no longer be read.
    fn read_input(&self, buf: &mut [u8], timeout: Duration) -> HidResult<usize>;
}

/// [`DeviceHandle`] backed by hidapi.
pub struct HidapiDevice {
    id: DeviceId,
    description: String,
    device: Mutex<hidapi::HidDevice>,
}

impl HidapiDevice {
    /// Wrap an opened hidapi device.
    #[must_use]
    pub fn new(id: DeviceId, device: hidapi::HidDevice, info: &hidapi::DeviceInfo) -> Self {
        let description = format!(
            "{} (serial {}, {:04x}:{:04x})",
            info.product_string().unwrap_or("unknown product"),
            info.serial_number().unwrap_or("none"),
            info.vendor_id(),
            info.product_id(),
        );
        Self { id, description, device: Mutex::new(device) }
    }
}

impl DeviceHandle for HidapiDevice {
    fn id(&self) -> DeviceId {
        self.id.clone()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn write_output(&self, report: &[u8]) -> HidResult<usize> {
        let written = self.device.lock().write(report).map_err(|e| HidError::Write(e.to_string()))?;
        if written < report.len() {
            debug!(written, expected = report.len(), "Partial output report write");
        }
        Ok(written)
    }

    fn read_input(&self, buf: &mut [u8], timeout: Duration) -> HidResult<usize> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        self.device.lock().read_timeout(buf, timeout_ms).map_err(|e| HidError::Read(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_device_id_format() {
        assert_eq!(DeviceId::usb(3, 12).as_str(), "usb:003:012");
        assert_eq!(DeviceId::usb(1, 2), DeviceId::new("usb:001:002"));
    }

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new("/dev/hidraw4");
        assert_eq!(id.to_string(), "/dev/hidraw4");
    }
}
