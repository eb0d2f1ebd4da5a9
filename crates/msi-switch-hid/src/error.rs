//! HID error types.

use thiserror::Error;

/// HID error type.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("HID subsystem initialization failed: {0}")]
    SubsystemInit(String),

    #[error("Failed to register device notifications: {0}")]
    Registration(String),

    #[error("Failed to open device {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Output report write failed: {0}")]
    Write(String),

    #[error("Input report read failed: {0}")]
    Read(String),

    #[error("Invalid report: {0}")]
    Report(#[from] msi_switch_core::Error),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("HID API error: {0}")]
    Api(#[from] hidapi::HidError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for HID operations.
pub type HidResult<T> = Result<T, HidError>;
