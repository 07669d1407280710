//! Soft-failure result types returned by the public conversion operations.
//!
//! Failures never escape a converter as `Err`; they are recorded in the
//! `error` field together with the chain of underlying causes.

use std::path::PathBuf;

use serde::Serialize;

/// Error descriptor carried by a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionFailure {
    /// Top-level error message.
    pub message: String,
    /// Underlying causes, outermost first.
    pub trace: Vec<String>,
}

impl ConversionFailure {
    /// Capture an error and its `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut cause = err.source();
        while let Some(c) = cause {
            trace.push(c.to_string());
            cause = c.source();
        }
        Self {
            message: err.to_string(),
            trace,
        }
    }
}

/// Outcome of a conversion or an attachment extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionResult {
    /// Files produced, in the order they were written.
    pub files: Vec<PathBuf>,
    /// Non-fatal problems encountered along the way.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Set when the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionFailure>,
}

impl ConversionResult {
    /// A result holding only an error.
    pub fn failed(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            error: Some(ConversionFailure::from_error(err)),
            ..Default::default()
        }
    }

    /// `true` when no error was recorded. Warnings do not count.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Fold another result into this one: files and warnings are appended and
    /// its error, if any, replaces ours.
    pub fn merge(&mut self, other: ConversionResult) {
        self.files.extend(other.files);
        self.warnings.extend(other.warnings);
        if other.error.is_some() {
            self.error = other.error;
        }
    }
}

/// Outcome of a dry-run attachment naming.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NamingResult {
    /// Planned file names, in extraction order.
    pub attachments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConversionFailure>,
}
