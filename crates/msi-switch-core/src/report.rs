//! Output report framing.

use crate::error::{Error, Result};

/// Check an output report against the device's declared report size.
///
/// Returns the report ID, which is the first byte of the report.
///
/// # Errors
/// Returns [`Error::OversizedReport`] if the report is longer than `max_len`,
/// or [`Error::EmptyReport`] if there is no report ID byte.
pub fn validate_output_report(report: &[u8], max_len: usize) -> Result<u8> {
    if report.len() > max_len {
        return Err(Error::OversizedReport { len: report.len(), max: max_len });
    }
    report.first().copied().ok_or(Error::EmptyReport)
}
