//! MSI Display Switch Core - Domain model for monitor input switching.
//!
//! This crate holds the pieces of the monitor protocol that do not touch
//! the USB stack: which device to look for, what an input-switch report
//! looks like on the wire, and how output reports are framed.

pub mod device;
pub mod error;
pub mod input;
pub mod report;

pub use device::{DeviceFilter, MONITOR_PRODUCT_ID, MSI_VENDOR_ID, REPORT_SIZE};
pub use error::{Error, Result};
pub use input::{InputSource, SWITCH_PAYLOAD_LEN, SWITCH_REPORT_ID};
pub use report::validate_output_report;
