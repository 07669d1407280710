//! Integration tests for message loading, conversion and attachment extraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailconvert::convert::{ConversionRequest, Converter, TargetFormat};
use mailconvert::error::{ConvertError, Result};
use mailconvert::model::message::{Attachment, HeaderValue, Message};
use mailconvert::parser::eml::load_message;
use mailconvert::render::encoding::EncodingNormalizer;
use mailconvert::render::pdf::{PageSetup, PdfRenderer};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Stands in for wkhtmltopdf: embeds the title so tests can see it.
struct FakePdf;

impl PdfRenderer for FakePdf {
    fn render(&self, html: &str, title: &str, _setup: &PageSetup) -> Result<Vec<u8>> {
        Ok(format!("%PDF-1.4\n% {title}\n% {} bytes of html\n", html.len()).into_bytes())
    }
}

fn open(name: &str) -> Converter<'static> {
    Converter::open(fixture(name))
        .unwrap()
        .with_renderer(Arc::new(FakePdf))
}

// ─── Plain message in all three formats ─────────────────────────────

#[test]
fn test_simple_message_converts_to_every_format() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let converter = open("simple.eml");

    for format in ["eml", "html", "pdf"] {
        let target = tmp.child(format!("simple.{format}"));
        let result = converter.convert(target.path(), &ConversionRequest::new(format));

        assert!(result.is_ok(), "{format}: {:?}", result.error);
        assert!(result.warnings.is_empty(), "{format}: {:?}", result.warnings);
        assert_eq!(result.files, vec![target.path().to_path_buf()]);
        target.assert(predicate::path::is_file());
        assert!(std::fs::metadata(target.path()).unwrap().len() > 0);
    }
}

#[test]
fn test_eml_output_is_the_original_mime() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("copy.eml");
    let result = open("simple.eml").convert(target.path(), &ConversionRequest::new("EML"));
    assert!(result.is_ok());
    assert_eq!(
        std::fs::read(target.path()).unwrap(),
        std::fs::read(fixture("simple.eml")).unwrap()
    );
}

#[test]
fn test_plain_body_is_wrapped_with_header_table() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("simple.html");
    open("simple.eml").convert(target.path(), &ConversionRequest::new("html"));

    target.assert(predicate::str::contains("Are we still on for lunch tomorrow?"));
    target.assert(predicate::str::contains("header-table"));
    target.assert(predicate::str::contains("Alice &lt;alice@example.com&gt;"));
    target.assert(predicate::str::contains("Lunch"));
}

#[test]
fn test_pdf_title_is_subject() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("simple.pdf");
    open("simple.eml").convert(target.path(), &ConversionRequest::new("pdf"));
    target.assert(predicate::str::starts_with("%PDF-1.4\n% Lunch\n"));
}

// ─── Encoded headers, inline images and hidden attachments ──────────

#[test]
fn test_encoded_subject_is_decoded() {
    let converter = open("invoice.eml");
    assert_eq!(converter.headers().subject.as_deref(), Some("Test €"));
    assert_eq!(
        converter.headers().from.as_deref(),
        Some("Billing <billing@example.com>")
    );
}

#[test]
fn test_hidden_inline_image_is_not_numbered() {
    let names = open("invoice.eml").attachment_names("pdf");
    assert!(names.error.is_none());
    assert_eq!(names.attachments, vec!["1-invoice.pdf"]);
    assert!(names.warnings.is_empty());
}

#[test]
fn test_inline_image_becomes_data_uri() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("invoice.html");
    let result = open("invoice.eml").convert(target.path(), &ConversionRequest::new("Html"));
    assert!(result.is_ok(), "{:?}", result.error);

    target.assert(predicate::str::contains("data:image/png;base64,iVBORw0KGgo="));
    target.assert(predicate::str::contains("cid:").not());
    target.assert(predicate::str::contains("Test €"));
}

#[test]
fn test_extract_attachments_next_to_target() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("invoice.pdf");
    let request = ConversionRequest::new("pdf").with_attachments(false);
    let result = open("invoice.eml").convert(target.path(), &request);
    assert!(result.is_ok(), "{:?}", result.error);

    let extracted = tmp.child("invoice.pdf-attachments").child("1-invoice.pdf");
    assert_eq!(
        result.files,
        vec![target.path().to_path_buf(), extracted.path().to_path_buf()]
    );
    extracted.assert(predicate::path::is_file());
    assert_eq!(std::fs::read(extracted.path()).unwrap(), b"%PDF-1.4");
}

// ─── Body encodings ─────────────────────────────────────────────────

#[test]
fn test_latin1_body_without_charset_is_repaired() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("latin1.html");
    let result = open("latin1.eml").convert(target.path(), &ConversionRequest::new("html"));
    assert!(result.is_ok(), "{:?}", result.error);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);

    target.assert(predicate::str::contains("Café crème is back on the menu."));
    target.assert(predicate::str::contains("\u{FFFD}").not());
}

#[test]
fn test_undecodable_body_is_reported() {
    let converter = open("latin1.eml")
        .with_normalizer(EncodingNormalizer::for_label("shift_jis").unwrap());
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("latin1.html");
    let result = converter.convert(target.path(), &ConversionRequest::new("html"));

    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("neither valid UTF-8 nor Shift_JIS"));
}

// ─── Embedded messages ──────────────────────────────────────────────

#[test]
fn test_embedded_message_named_after_subject() {
    let names = open("forwarded.eml").attachment_names("html");
    assert_eq!(names.attachments, vec!["1-Re: hi.html"]);
}

#[test]
fn test_recursive_extraction_descends_into_embedded_message() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("fwd.html");
    let request = ConversionRequest::new("html").with_attachments(true);
    let result = open("forwarded.eml").convert(target.path(), &request);
    assert!(result.is_ok(), "{:?}", result.error);

    let embedded = tmp.child("fwd.html-attachments").child("1-Re: hi.html");
    let notes = tmp
        .child("fwd.html-attachments")
        .child("1-Re: hi.html-attachments")
        .child("1-notes.txt");

    assert_eq!(
        result.files,
        vec![
            target.path().to_path_buf(),
            embedded.path().to_path_buf(),
            notes.path().to_path_buf(),
        ]
    );
    embedded.assert(predicate::str::contains("Re: hi"));
    notes.assert(predicate::str::contains("remember the milk"));
}

#[test]
fn test_non_recursive_extraction_stops_at_embedded_message() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("fwd.eml");
    let request = ConversionRequest::new("eml").with_attachments(false);
    let result = open("forwarded.eml").convert(target.path(), &request);
    assert!(result.is_ok(), "{:?}", result.error);

    assert_eq!(result.files.len(), 2);
    tmp.child("fwd.eml-attachments")
        .child("1-Re: hi.eml")
        .assert(predicate::str::contains("Subject: Re: hi"));
    tmp.child("fwd.eml-attachments")
        .child("1-Re: hi.eml-attachments")
        .assert(predicate::path::missing());
}

#[test]
fn test_extract_attachments_directly() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let result = open("forwarded.eml").extract_attachments(tmp.path(), false, TargetFormat::Pdf);
    assert!(result.is_ok(), "{:?}", result.error);
    tmp.child("1-Re: hi.pdf")
        .assert(predicate::str::starts_with("%PDF-1.4\n% Re: hi\n"));
}

// ─── Failures ───────────────────────────────────────────────────────

#[test]
fn test_unsupported_format_produces_no_files() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("simple.docx");
    let request = ConversionRequest::new("docx").with_attachments(true);
    let result = open("simple.eml").convert(target.path(), &request);

    let error = result.error.expect("conversion should fail");
    assert_eq!(error.message, "Unknown target format: DOCX");
    assert!(result.files.is_empty());
    target.assert(predicate::path::missing());
}

#[test]
fn test_missing_input_file() {
    let err = load_message(fixture("does-not-exist.eml")).unwrap_err();
    assert!(matches!(err, ConvertError::MessageNotFound(_)));
    assert!(Converter::open(fixture("does-not-exist.eml")).is_err());
}

#[test]
fn test_failing_renderer_reports_error() {
    struct Broken;
    impl PdfRenderer for Broken {
        fn render(&self, _: &str, _: &str, _: &PageSetup) -> Result<Vec<u8>> {
            Err(ConvertError::render("no engine available"))
        }
    }

    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("simple.pdf");
    let converter = Converter::open(fixture("simple.eml"))
        .unwrap()
        .with_renderer(Arc::new(Broken));
    let result = converter.convert(target.path(), &ConversionRequest::new("pdf"));

    assert!(result.error.unwrap().message.contains("no engine available"));
    assert!(result.files.is_empty());
    target.assert(predicate::path::missing());
}

#[test]
fn test_nested_failure_stops_extraction() {
    /// Fails only for the embedded message, identified by its title.
    struct FailsForInner;
    impl PdfRenderer for FailsForInner {
        fn render(&self, _: &str, title: &str, _: &PageSetup) -> Result<Vec<u8>> {
            if title == "inner" {
                Err(ConvertError::render("boom"))
            } else {
                Ok(b"%PDF-1.4".to_vec())
            }
        }
    }

    let mut inner = Message::default();
    inner.push_header("Subject", "inner");
    let mut msg = Message::default();
    msg.push_header("Subject", "outer");
    msg.attachments = vec![
        Attachment {
            embedded: Some(Box::new(inner)),
            mime_type: "message/rfc822".into(),
            ..Default::default()
        },
        Attachment {
            filename: Some("after.txt".into()),
            data: b"later sibling".to_vec(),
            ..Default::default()
        },
    ];

    let tmp = assert_fs::TempDir::new().unwrap();
    let target = tmp.child("m.pdf");
    let converter = Converter::new(&msg).with_renderer(Arc::new(FailsForInner));
    let request = ConversionRequest::new("pdf").with_attachments(false);
    let result = converter.convert(target.path(), &request);

    let error = result.error.expect("embedded conversion should fail");
    assert!(error.message.starts_with("Conversion of embedded message"));
    assert!(error.message.contains("1-inner.pdf"));
    assert!(error.message.contains("boom"));
    assert_eq!(result.files, vec![target.path().to_path_buf()]);
    target.assert(predicate::path::is_file());
    let attachments = tmp.child("m.pdf-attachments");
    attachments.child("1-inner.pdf").assert(predicate::path::missing());
    attachments.child("2-after.txt").assert(predicate::path::missing());
}

// ─── In-memory messages ─────────────────────────────────────────────

#[test]
fn test_header_lookup_is_case_insensitive() {
    let mut msg = Message::default();
    msg.push_header("SUBJECT", "Shouting");
    msg.push_header("from", "quiet@example.com");

    assert_eq!(
        msg.header("Subject").and_then(HeaderValue::first),
        Some("Shouting")
    );
    let converter = Converter::new(&msg);
    assert_eq!(converter.headers().subject.as_deref(), Some("Shouting"));
    assert_eq!(converter.headers().from.as_deref(), Some("quiet@example.com"));
    assert!(converter.headers().to.is_none());
}

#[test]
fn test_latin1_body_is_repaired() {
    let msg = Message {
        body_text: b"Caf\xe9 cr\xe8me".to_vec(),
        ..Default::default()
    };
    let converter = Converter::new(&msg);
    assert!(converter.html_body().contains("Café crème"));
    assert!(converter.body_warnings().is_empty());
}
