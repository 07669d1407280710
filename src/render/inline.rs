//! Content-ID resolution: replaces `cid:` references with base64 data URIs
//! so inline images render without external fetches.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::model::message::Message;

/// `[cid:<id>]` markers left in plain-text bodies.
static RE_CID_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[cid:(.*?)\]").unwrap());
/// `cid:<id>` inside HTML attributes, up to the closing quote.
static RE_CID_HTML: Lazy<Regex> = Lazy::new(|| Regex::new(r#"cid:([^"]*)"#).unwrap());

/// Build a `data:` URI for the attachment whose content-id equals `cid`.
///
/// Matching is exact; the id pattern above is permissive but lookup is not.
pub fn data_uri(message: &Message, cid: &str) -> Option<String> {
    let attachment = message.attachment_by_content_id(cid)?;
    Some(format!(
        "data:{};base64,{}",
        attachment.mime_type,
        STANDARD.encode(&attachment.data)
    ))
}

/// Rewrite every content-id reference in `html`.
///
/// Bracketed plain-text markers become `<img>` tags first, then attribute
/// references are replaced in place. Unknown ids are blanked.
pub fn resolve_inline_references(html: &str, message: &Message) -> String {
    let mut unresolved = 0usize;

    let html = RE_CID_PLAIN.replace_all(html, |caps: &Captures<'_>| {
        match data_uri(message, &caps[1]) {
            Some(uri) => format!("<img src=\"{uri}\"/>"),
            None => {
                unresolved += 1;
                "<img src=\"\"/>".to_string()
            }
        }
    });

    let html = RE_CID_HTML.replace_all(&html, |caps: &Captures<'_>| {
        data_uri(message, &caps[1]).unwrap_or_else(|| {
            unresolved += 1;
            String::new()
        })
    });

    if unresolved > 0 {
        debug!(unresolved, "Blanked content-id references without a matching attachment");
    }
    html.into_owned()
}
