//! Centralized error types for mailconvert.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailconvert library.
///
/// Public conversion operations never return these directly; they are folded
/// into a [`crate::model::outcome::ConversionFailure`] at the converter
/// boundary.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source message does not exist.
    #[error("Message file not found: {0}")]
    MessageNotFound(PathBuf),

    /// The source bytes could not be parsed as a message.
    #[error("File does not appear to be a valid message: {0}")]
    InvalidMessage(PathBuf),

    /// The requested target format is not one of EML, HTML or PDF.
    #[error("Unknown target format: {0}")]
    UnsupportedFormat(String),

    /// The HTML-to-PDF engine failed.
    #[error("PDF rendering failed: {reason}")]
    Render {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Converting an embedded message failed; extraction stops there.
    #[error("Conversion of embedded message '{path}' failed: {message}")]
    NestedConversion { path: PathBuf, message: String },
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Render` variant without an underlying I/O cause.
    pub fn render(reason: impl Into<String>) -> Self {
        Self::Render {
            reason: reason.into(),
            source: None,
        }
    }
}
