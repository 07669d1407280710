//! The conversion orchestrator.
//!
//! A [`Converter`] wraps exactly one [`Message`] and turns it into EML, HTML
//! or PDF output, optionally extracting attachments next to it. Derived
//! values (display headers, the finalized HTML body) are computed on first
//! use and cached for the lifetime of the converter.
//!
//! ```text
//! Start → BodyPrepared → Rendered → [AttachmentsExtracted] → Done
//!   └──────────────┴──────────┴──────────────┴──→ Errored
//! ```
//!
//! Public operations never return `Err`: failures are recorded in the
//! returned [`ConversionResult`] / [`NamingResult`].

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::export::attachment;
use crate::export::writer::write_output;
use crate::model::message::Message;
use crate::model::outcome::{ConversionFailure, ConversionResult, NamingResult};
use crate::parser::{eml, header};
use crate::parser::header::Headers;
use crate::render::encoding::EncodingNormalizer;
use crate::render::pdf::{PageSetup, PdfOptions, PdfRenderer, WkHtmlToPdf, DEFAULT_TITLE};
use crate::render::{html, inline};

/// Output formats a message can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Eml,
    Html,
    Pdf,
}

impl TargetFormat {
    /// File extension, also used for embedded-message file names.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Eml => "eml",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = ConvertError;

    /// Case-insensitive: `"PDF"`, `"pdf"` and `" Pdf "` are all accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eml" => Ok(Self::Eml),
            "html" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            _ => Err(ConvertError::UnsupportedFormat(s.trim().to_uppercase())),
        }
    }
}

/// A single conversion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRequest {
    /// Target format name; validated when the conversion runs.
    pub format: String,
    /// Also extract attachments into `<target>-attachments`.
    pub extract_attachments: bool,
    /// Extract attachments of embedded messages as well.
    pub recursive: bool,
    /// Page overrides, used for PDF output only.
    pub pdf: PdfOptions,
}

impl ConversionRequest {
    /// A request for `format` without attachment extraction.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    /// Enable attachment extraction, optionally recursing into embedded messages.
    pub fn with_attachments(mut self, recursive: bool) -> Self {
        self.extract_attachments = true;
        self.recursive = recursive;
        self
    }

    /// Set PDF page overrides.
    pub fn with_pdf_options(mut self, pdf: PdfOptions) -> Self {
        self.pdf = pdf;
        self
    }
}

/// Where a conversion is in its lifecycle; reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    BodyPrepared,
    Rendered,
    AttachmentsExtracted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::BodyPrepared => "body-prepared",
            Self::Rendered => "rendered",
            Self::AttachmentsExtracted => "attachments-extracted",
        };
        f.write_str(name)
    }
}

/// The finalized HTML body and the warnings produced while building it.
#[derive(Debug, Clone)]
struct PreparedBody {
    html: String,
    warnings: Vec<String>,
}

/// Converts one message to the supported output formats.
pub struct Converter<'a> {
    message: Cow<'a, Message>,
    renderer: Arc<dyn PdfRenderer>,
    normalizer: EncodingNormalizer,
    page_defaults: PageSetup,
    headers: OnceCell<Headers>,
    body: OnceCell<PreparedBody>,
}

impl<'a> Converter<'a> {
    /// Wrap a borrowed message.
    pub fn new(message: &'a Message) -> Self {
        Self::with_message(Cow::Borrowed(message))
    }

    fn with_message(message: Cow<'a, Message>) -> Self {
        Self {
            message,
            renderer: Arc::new(WkHtmlToPdf::default()),
            normalizer: EncodingNormalizer::default(),
            page_defaults: PageSetup::default(),
            headers: OnceCell::new(),
            body: OnceCell::new(),
        }
    }

    /// Use a different HTML-to-PDF engine.
    pub fn with_renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Use a different body encoding fallback chain.
    pub fn with_normalizer(mut self, normalizer: EncodingNormalizer) -> Self {
        self.normalizer = normalizer;
        self.body = OnceCell::new();
        self
    }

    /// Page geometry applied before caller overrides.
    pub fn with_page_defaults(mut self, defaults: PageSetup) -> Self {
        self.page_defaults = defaults;
        self
    }

    /// The wrapped message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// A converter for an embedded message, sharing this converter's
    /// collaborators but none of its cached state.
    pub fn child<'m>(&self, message: &'m Message) -> Converter<'m> {
        Converter::new(message)
            .with_renderer(Arc::clone(&self.renderer))
            .with_normalizer(self.normalizer)
            .with_page_defaults(self.page_defaults.clone())
    }

    /// The decoded display headers.
    pub fn headers(&self) -> &Headers {
        self.headers
            .get_or_init(|| header::extract_headers(&self.message))
    }

    /// The raw MIME text of the message.
    pub fn mime(&self) -> &[u8] {
        &self.message.raw_mime
    }

    /// The finalized HTML body: encoding repaired, header table injected,
    /// inline references resolved.
    pub fn html_body(&self) -> &str {
        &self.prepared_body().html
    }

    /// Warnings produced while preparing the body.
    pub fn body_warnings(&self) -> &[String] {
        &self.prepared_body().warnings
    }

    fn prepared_body(&self) -> &PreparedBody {
        self.body.get_or_init(|| {
            let raw: Cow<'_, [u8]> = match &self.message.body_html {
                Some(html) => Cow::Borrowed(html.as_slice()),
                None => Cow::Owned(html::wrap_plain_body(&self.message.body_text)),
            };
            let normalized = self.normalizer.normalize(&raw);
            let with_headers = html::inject_headers(&normalized.text, self.headers());
            let html = inline::resolve_inline_references(&with_headers, &self.message);
            debug!(bytes = html.len(), "Prepared HTML body");
            PreparedBody {
                html,
                warnings: normalized.warning.into_iter().collect(),
            }
        })
    }

    /// Convert the message into `target`.
    ///
    /// The returned result lists the files written. When the request asks for
    /// attachments, they are extracted into `<target>-attachments`.
    pub fn convert(&self, target: &Path, request: &ConversionRequest) -> ConversionResult {
        let mut result = ConversionResult::default();
        let mut stage = Stage::Start;

        let format = match request.format.parse::<TargetFormat>() {
            Ok(format) => format,
            Err(e) => return self.fail(result, stage, &e),
        };

        let produced = self.produce(format, &request.pdf, &mut stage);
        if stage != Stage::Start {
            result.warnings.extend_from_slice(self.body_warnings());
        }
        let bytes = match produced {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(result, stage, &e),
        };

        if let Err(e) = write_output(target, &bytes) {
            return self.fail(result, stage, &e);
        }
        info!(path = %target.display(), format = %format, "Wrote converted message");
        result.files.push(target.to_path_buf());

        if request.extract_attachments {
            let dir = attachments_dir(target);
            let extracted = self.extract_attachments(&dir, request.recursive, format);
            result.merge(extracted);
            if result.error.is_some() {
                warn!(stage = %stage, path = %target.display(), "Attachment extraction failed");
                return result;
            }
            stage = Stage::AttachmentsExtracted;
        }

        debug!(stage = %stage, files = result.files.len(), "Conversion done");
        result
    }

    /// Extract attachments into `output_dir`, naming embedded messages with
    /// the extension of `format`.
    pub fn extract_attachments(
        &self,
        output_dir: &Path,
        recursive: bool,
        format: TargetFormat,
    ) -> ConversionResult {
        attachment::extract_attachments(self, output_dir, recursive, format)
    }

    /// Plan attachment file names without writing anything.
    pub fn attachment_names(&self, format: &str) -> NamingResult {
        match format.parse::<TargetFormat>() {
            Ok(format) => {
                let plan = attachment::plan_attachments(&self.message, format);
                NamingResult {
                    attachments: plan.file_names(),
                    warnings: plan.warnings,
                    error: None,
                }
            }
            Err(e) => NamingResult {
                error: Some(ConversionFailure::from_error(&e)),
                ..Default::default()
            },
        }
    }

    /// Output bytes for `format`, advancing `stage` as each step completes.
    fn produce(
        &self,
        format: TargetFormat,
        options: &PdfOptions,
        stage: &mut Stage,
    ) -> Result<Cow<'_, [u8]>> {
        let bytes = match format {
            TargetFormat::Eml => Cow::Borrowed(self.mime()),
            TargetFormat::Html => {
                let html = self.html_body();
                *stage = Stage::BodyPrepared;
                Cow::Borrowed(html.as_bytes())
            }
            TargetFormat::Pdf => {
                self.html_body();
                *stage = Stage::BodyPrepared;
                Cow::Owned(self.render_pdf(options)?)
            }
        };
        *stage = Stage::Rendered;
        Ok(bytes)
    }

    fn render_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let setup = options.resolve(&self.page_defaults);
        let title = self
            .headers()
            .subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);
        self.renderer.render(self.html_body(), title, &setup)
    }

    fn fail(&self, mut result: ConversionResult, stage: Stage, err: &ConvertError) -> ConversionResult {
        warn!(stage = %stage, error = %err, "Conversion failed");
        result.error = Some(ConversionFailure::from_error(err));
        result
    }
}

impl Converter<'static> {
    /// Wrap an owned message.
    pub fn from_owned(message: Message) -> Self {
        Self::with_message(Cow::Owned(message))
    }

    /// Load an `.eml` file and wrap it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        eml::load_message(path).map(Self::from_owned)
    }
}

/// Directory receiving the attachments of `target`: `<target>-attachments`.
pub fn attachments_dir(target: &Path) -> PathBuf {
    let mut dir = target.as_os_str().to_owned();
    dir.push("-attachments");
    PathBuf::from(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Attachment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records what it was asked to render and returns a fixed document.
    #[derive(Default)]
    struct RecordingRenderer {
        calls: AtomicUsize,
        last: Mutex<Option<(String, PageSetup)>>,
    }

    impl PdfRenderer for RecordingRenderer {
        fn render(&self, _html: &str, title: &str, setup: &PageSetup) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((title.to_string(), setup.clone()));
            Ok(b"%PDF-1.4 fake".to_vec())
        }
    }

    struct FailingRenderer;

    impl PdfRenderer for FailingRenderer {
        fn render(&self, _: &str, _: &str, _: &PageSetup) -> Result<Vec<u8>> {
            Err(ConvertError::render("engine exploded"))
        }
    }

    fn simple_message() -> Message {
        let mut msg = Message {
            body_text: b"Hello [cid:logo]".to_vec(),
            raw_mime: b"Subject: Hi\r\n\r\nHello\r\n".to_vec(),
            attachments: vec![Attachment {
                content_id: Some("logo".into()),
                mime_type: "image/gif".into(),
                hidden: true,
                data: b"GIF89a".to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };
        msg.push_header("Subject", "Hi");
        msg.push_header("From", "a@example.com");
        msg
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<TargetFormat>().unwrap(), TargetFormat::Pdf);
        assert_eq!("html".parse::<TargetFormat>().unwrap(), TargetFormat::Html);
        assert_eq!(" Eml ".parse::<TargetFormat>().unwrap(), TargetFormat::Eml);
        assert!(matches!(
            "docx".parse::<TargetFormat>(),
            Err(ConvertError::UnsupportedFormat(f)) if f == "DOCX"
        ));
    }

    #[test]
    fn test_attachments_dir() {
        assert_eq!(
            attachments_dir(Path::new("/out/mail.pdf")),
            PathBuf::from("/out/mail.pdf-attachments")
        );
    }

    #[test]
    fn test_body_is_prepared_once() {
        let msg = simple_message();
        let converter = Converter::new(&msg);
        let first = converter.html_body() as *const str;
        let second = converter.html_body() as *const str;
        assert_eq!(first, second);
        assert!(converter.html_body().contains("data:image/gif;base64,R0lGODlh"));
        assert!(converter.html_body().contains("header-table"));
    }

    #[test]
    fn test_html_body_prefers_html_part() {
        let mut msg = simple_message();
        msg.body_html = Some(b"<html><body><p>rich</p></body></html>".to_vec());
        let converter = Converter::new(&msg);
        assert!(converter.html_body().contains("<p>rich</p>"));
        assert!(!converter.html_body().contains("0.5cm"));
    }

    #[test]
    fn test_pdf_title_and_options() {
        let tmp = tempfile::tempdir().unwrap();
        let renderer = Arc::new(RecordingRenderer::default());
        let msg = simple_message();
        let converter = Converter::new(&msg).with_renderer(renderer.clone());

        let request = ConversionRequest::new("pdf").with_pdf_options(PdfOptions {
            dpi: Some(96),
            ..Default::default()
        });
        let result = converter.convert(&tmp.path().join("m.pdf"), &request);
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);

        let (title, setup) = renderer.last.lock().unwrap().clone().unwrap();
        assert_eq!(title, "Hi");
        assert_eq!(setup.dpi, 96);
        assert_eq!(setup.page_size, "A4");
    }

    #[test]
    fn test_pdf_title_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let renderer = Arc::new(RecordingRenderer::default());
        let msg = Message::default();
        let converter = Converter::new(&msg).with_renderer(renderer.clone());
        converter.convert(&tmp.path().join("m.pdf"), &ConversionRequest::new("PDF"));
        let (title, _) = renderer.last.lock().unwrap().clone().unwrap();
        assert_eq!(title, DEFAULT_TITLE);
    }

    #[test]
    fn test_renderer_failure_is_captured() {
        let tmp = tempfile::tempdir().unwrap();
        let msg = simple_message();
        let converter = Converter::new(&msg).with_renderer(Arc::new(FailingRenderer));
        let target = tmp.path().join("m.pdf");
        let result = converter.convert(&target, &ConversionRequest::new("pdf"));
        let error = result.error.unwrap();
        assert!(error.message.contains("engine exploded"));
        assert!(result.files.is_empty());
        assert!(!target.exists());
    }

    #[test]
    fn test_stage_tracks_completed_steps() {
        let msg = simple_message();
        let failing = Converter::new(&msg).with_renderer(Arc::new(FailingRenderer));
        let mut stage = Stage::Start;
        assert!(failing
            .produce(TargetFormat::Pdf, &PdfOptions::default(), &mut stage)
            .is_err());
        assert_eq!(stage, Stage::BodyPrepared);

        let converter = Converter::new(&msg);
        let mut stage = Stage::Start;
        converter
            .produce(TargetFormat::Html, &PdfOptions::default(), &mut stage)
            .unwrap();
        assert_eq!(stage, Stage::Rendered);

        let mut stage = Stage::Start;
        let raw = converter
            .produce(TargetFormat::Eml, &PdfOptions::default(), &mut stage)
            .unwrap();
        assert_eq!(&*raw, msg.raw_mime.as_slice());
        assert_eq!(stage, Stage::Rendered);
    }

    #[test]
    fn test_unsupported_format_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let msg = simple_message();
        let target = tmp.path().join("m.docx");
        let result = Converter::new(&msg).convert(&target, &ConversionRequest::new("docx"));
        assert!(result.error.unwrap().message.contains("DOCX"));
        assert!(result.files.is_empty());
        assert!(!target.exists());
    }

    #[test]
    fn test_attachment_names_rejects_bad_format() {
        let msg = simple_message();
        let names = Converter::new(&msg).attachment_names("txt");
        assert!(names.error.is_some());
        assert!(names.attachments.is_empty());
    }
}
