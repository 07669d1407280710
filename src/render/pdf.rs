//! PDF output: page geometry options and the HTML-to-PDF engine seam.
//!
//! The engine itself is external. [`WkHtmlToPdf`] drives the `wkhtmltopdf`
//! program; tests and embedders can supply any other [`PdfRenderer`].

use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConvertError, Result};

/// Title used when the message has no subject.
pub const DEFAULT_TITLE: &str = "message";

/// Fully resolved page geometry handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSetup {
    pub page_size: String,
    pub margin_top: String,
    pub margin_bottom: String,
    pub margin_left: String,
    pub margin_right: String,
    pub dpi: u32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            margin_top: "10mm".to_string(),
            margin_bottom: "10mm".to_string(),
            margin_left: "10mm".to_string(),
            margin_right: "10mm".to_string(),
            dpi: 300,
        }
    }
}

/// Caller-supplied page overrides. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfOptions {
    pub page_size: Option<String>,
    pub margin_top: Option<String>,
    pub margin_bottom: Option<String>,
    pub margin_left: Option<String>,
    pub margin_right: Option<String>,
    pub dpi: Option<u32>,
}

impl PdfOptions {
    /// Merge these overrides on top of `defaults`.
    pub fn resolve(&self, defaults: &PageSetup) -> PageSetup {
        let pick = |value: &Option<String>, fallback: &String| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map_or_else(|| fallback.clone(), str::to_string)
        };
        PageSetup {
            page_size: pick(&self.page_size, &defaults.page_size),
            margin_top: pick(&self.margin_top, &defaults.margin_top),
            margin_bottom: pick(&self.margin_bottom, &defaults.margin_bottom),
            margin_left: pick(&self.margin_left, &defaults.margin_left),
            margin_right: pick(&self.margin_right, &defaults.margin_right),
            dpi: self.dpi.filter(|d| *d > 0).unwrap_or(defaults.dpi),
        }
    }
}

/// An HTML-to-PDF engine.
pub trait PdfRenderer: Send + Sync {
    /// Render a complete HTML document to PDF bytes.
    fn render(&self, html: &str, title: &str, setup: &PageSetup) -> Result<Vec<u8>>;
}

/// Renders through the external `wkhtmltopdf` program.
///
/// The HTML is written to a scratch file and the PDF read back from another,
/// both inside a temporary directory that is removed afterwards.
#[derive(Debug, Clone)]
pub struct WkHtmlToPdf {
    program: PathBuf,
}

impl Default for WkHtmlToPdf {
    fn default() -> Self {
        Self {
            program: PathBuf::from("wkhtmltopdf"),
        }
    }
}

impl WkHtmlToPdf {
    /// Use a specific `wkhtmltopdf` binary.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for the given geometry and title.
    fn args(setup: &PageSetup, title: &str) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--encoding".to_string(),
            "UTF-8".to_string(),
            "--page-size".to_string(),
            setup.page_size.clone(),
            "--margin-top".to_string(),
            setup.margin_top.clone(),
            "--margin-bottom".to_string(),
            setup.margin_bottom.clone(),
            "--margin-left".to_string(),
            setup.margin_left.clone(),
            "--margin-right".to_string(),
            setup.margin_right.clone(),
            "--dpi".to_string(),
            setup.dpi.to_string(),
            "--title".to_string(),
            title.to_string(),
        ]
    }
}

impl PdfRenderer for WkHtmlToPdf {
    fn render(&self, html: &str, title: &str, setup: &PageSetup) -> Result<Vec<u8>> {
        let scratch = tempfile::Builder::new()
            .prefix("mailconvert-")
            .tempdir()
            .map_err(|e| ConvertError::Render {
                reason: "could not create scratch directory".into(),
                source: Some(e),
            })?;
        let input = scratch.path().join("message.html");
        let output = scratch.path().join("message.pdf");
        std::fs::write(&input, html).map_err(|e| ConvertError::io(&input, e))?;

        debug!(
            program = %self.program.display(),
            page_size = %setup.page_size,
            dpi = setup.dpi,
            "Invoking wkhtmltopdf"
        );
        let out = Command::new(&self.program)
            .args(Self::args(setup, title))
            .arg(&input)
            .arg(&output)
            .output()
            .map_err(|e| ConvertError::Render {
                reason: format!("could not run '{}'", self.program.display()),
                source: Some(e),
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ConvertError::render(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                out.status,
                stderr.trim()
            )));
        }

        let pdf = std::fs::read(&output).map_err(|e| ConvertError::io(&output, e))?;
        if pdf.is_empty() {
            return Err(ConvertError::render("engine produced an empty document"));
        }
        Ok(pdf)
    }
}
