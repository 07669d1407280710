//! Attachment naming and extraction.
//!
//! Non-hidden attachments are numbered in document order with a shared,
//! zero-padded prefix. Embedded messages are converted recursively with a
//! nested [`Converter`]; regular attachments are written verbatim.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::convert::{ConversionRequest, Converter, TargetFormat};
use crate::error::ConvertError;
use crate::model::message::{Attachment, Message};
use crate::model::outcome::{ConversionFailure, ConversionResult};
use crate::parser::header;

use super::writer::write_output;

/// What a planned entry will produce.
#[derive(Debug, Clone, Copy)]
pub enum PlannedItem<'m> {
    /// An embedded message, re-rendered in the target format.
    Embedded(&'m Message),
    /// A regular attachment, written as-is.
    File(&'m Attachment),
}

/// One numbered output of an extraction.
#[derive(Debug, Clone)]
pub struct PlannedAttachment<'m> {
    /// `<prefix>-<name>`, relative to the output directory.
    pub file_name: String,
    pub item: PlannedItem<'m>,
}

/// The ordered naming plan for a message's attachments.
#[derive(Debug, Clone, Default)]
pub struct AttachmentPlan<'m> {
    pub entries: Vec<PlannedAttachment<'m>>,
    pub warnings: Vec<String>,
}

impl AttachmentPlan<'_> {
    /// Planned file names in order.
    pub fn file_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.file_name.clone()).collect()
    }
}

/// Digit width of the numeric prefix for `count` non-hidden attachments.
pub fn prefix_width(count: usize) -> usize {
    (count + 1) / 10 + 1
}

/// Replace characters that would let a name leave the output directory.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Plan names for every non-hidden attachment of `message`.
///
/// Attachments that are neither embedded messages nor carry a filename are
/// reported as warnings and do not consume a number.
pub fn plan_attachments(message: &Message, format: TargetFormat) -> AttachmentPlan<'_> {
    let visible: Vec<&Attachment> = message.attachments.iter().filter(|a| !a.hidden).collect();
    let width = prefix_width(visible.len());

    let mut plan = AttachmentPlan::default();
    let mut index = 1usize;

    for attachment in visible {
        let prefix = format!("{index:0width$}-");
        let (name, item) = if let Some(sub) = attachment.embedded.as_deref() {
            let base = attachment
                .display_name
                .clone()
                .or_else(|| header::extract_headers(sub).subject)
                .unwrap_or_default();
            (
                format!("{base}.{}", format.extension()),
                PlannedItem::Embedded(sub),
            )
        } else if let Some(filename) = &attachment.filename {
            (filename.clone(), PlannedItem::File(attachment))
        } else {
            let label = attachment.display_name.as_deref().unwrap_or("");
            warn!(display_name = label, "Attachment has no name, skipping");
            plan.warnings
                .push(format!("Attachment {label} cannot be saved"));
            continue;
        };

        plan.entries.push(PlannedAttachment {
            file_name: format!("{prefix}{}", safe_file_name(&name)),
            item,
        });
        index += 1;
    }

    plan
}

/// Extract the attachments of `parent`'s message into `output_dir`.
///
/// Embedded messages are converted with `extract_attachments` set to
/// `recursive`. The first failing embedded conversion stops the extraction;
/// its error becomes this result's error.
pub fn extract_attachments(
    parent: &Converter<'_>,
    output_dir: &Path,
    recursive: bool,
    format: TargetFormat,
) -> ConversionResult {
    let plan = plan_attachments(parent.message(), format);
    let mut result = ConversionResult {
        warnings: plan.warnings.clone(),
        ..Default::default()
    };

    for entry in &plan.entries {
        let path = output_dir.join(&entry.file_name);
        match entry.item {
            PlannedItem::Embedded(sub) => {
                debug!(path = %path.display(), "Converting embedded message");
                let request = ConversionRequest {
                    format: format.to_string(),
                    extract_attachments: recursive,
                    recursive,
                    pdf: Default::default(),
                };
                let mut nested = parent.child(sub).convert(&path, &request);
                if let Some(failure) = nested.error.take() {
                    result.files.append(&mut nested.files);
                    result.warnings.append(&mut nested.warnings);
                    result.error = Some(nested_failure(&path, failure));
                    return result;
                }
                result.merge(nested);
            }
            PlannedItem::File(attachment) => {
                if let Err(e) = write_output(&path, &attachment.data) {
                    warn!(path = %path.display(), error = %e, "Failed to write attachment");
                    result.error = Some(ConversionFailure::from_error(&e));
                    return result;
                }
                result.files.push(path);
            }
        }
    }

    info!(
        dir = %output_dir.display(),
        files = result.files.len(),
        "Extracted attachments"
    );
    result
}

/// Wrap a nested conversion failure, keeping its trace.
fn nested_failure(path: &Path, inner: ConversionFailure) -> ConversionFailure {
    let err = ConvertError::NestedConversion {
        path: PathBuf::from(path),
        message: inner.message.clone(),
    };
    let mut failure = ConversionFailure::from_error(&err);
    failure.trace.push(inner.message);
    failure.trace.extend(inner.trace);
    failure
}
