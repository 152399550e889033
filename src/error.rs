//! Error types for blackbox log decoding.
//!
//! Only unrecoverable conditions surface as [`DecodeError`]: a header that
//! cannot describe its own frames, a predictor whose input field is absent,
//! or an I/O failure while loading a file. Recoverable wire-level damage
//! (corrupt frames, malformed variable-byte integers, truncation mid-frame)
//! is reported as data — invalid-frame events and zero values — so that one
//! bad byte never aborts a multi-megabyte log.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for decoding operations.
pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Main error type for blackbox log decoding.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Log file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Header incomplete: frame type '{frame_type}' {details}")]
    HeaderIncomplete { frame_type: char, details: String },

    #[error("Field '{field}' uses unsupported predictor {code}")]
    UnsupportedPredictor { field: String, code: u8 },

    #[error("Field '{field}' uses unsupported encoding {code}")]
    UnsupportedEncoding { field: String, code: u8 },

    #[error("Predictor input missing: {details}")]
    MissingPredictorInput { details: String },

    #[error("Log index {index} out of range (log count is {count})")]
    LogIndexOutOfRange { index: usize, count: usize },

    #[error("Log {index} cannot be opened: {reason}")]
    LogUnreadable { index: usize, reason: String },

    #[error("No log is open")]
    NoOpenLog,
}

impl DecodeError {
    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        DecodeError::File { path, source }
    }

    /// Helper constructor for an incomplete frame definition.
    pub fn header_incomplete(frame_type: char, details: impl Into<String>) -> Self {
        DecodeError::HeaderIncomplete { frame_type, details: details.into() }
    }

    /// Helper constructor for a predictor whose required input is absent.
    pub fn missing_predictor_input(details: impl Into<String>) -> Self {
        DecodeError::MissingPredictorInput { details: details.into() }
    }

    /// Returns whether the error invalidates a whole sub-log as opposed to
    /// a single open attempt. Errors of this kind are recorded in the
    /// sub-log directory so later `open_log` calls can reject it cheaply.
    pub fn poisons_log(&self) -> bool {
        match self {
            DecodeError::HeaderIncomplete { .. } => true,
            DecodeError::UnsupportedPredictor { .. } => true,
            DecodeError::UnsupportedEncoding { .. } => true,
            DecodeError::MissingPredictorInput { .. } => true,
            DecodeError::File { .. } => false,
            DecodeError::LogIndexOutOfRange { .. } => false,
            DecodeError::LogUnreadable { .. } => false,
            DecodeError::NoOpenLog => false,
        }
    }
}
