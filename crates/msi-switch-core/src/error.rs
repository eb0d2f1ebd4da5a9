//! Error types for MSI Display Switch core.

use thiserror::Error;

/// Core error type for report framing and input selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Output report too large for USB report: {len} bytes (max {max})")]
    OversizedReport { len: usize, max: usize },

    #[error("Output report is empty, no report ID")]
    EmptyReport,

    #[error("Unknown input source: {0}")]
    UnknownInputSource(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
