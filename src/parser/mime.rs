//! MIME adaptation: turns a `mail-parser` message into the owned [`Message`] model.

use base64::Engine as _;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::model::message::{Attachment, Message};
use crate::parser::header;

/// Maximum depth for embedded messages (to prevent stack overflow on adversarial input).
const MAX_DEPTH: usize = 10;

/// Parse a complete raw message (headers + body) into a [`Message`].
///
/// Returns `None` when `mail-parser` cannot make sense of the bytes.
pub fn parse_message(raw_message: &[u8]) -> Option<Message> {
    let parsed = MessageParser::default().parse(raw_message)?;
    Some(from_parsed(&parsed, 0))
}

/// Build the owned model from a parsed message, recursing into `message/rfc822` parts.
fn from_parsed(msg: &mail_parser::Message<'_>, depth: usize) -> Message {
    let raw = msg.raw_message();

    let mut message = Message {
        raw_mime: raw.to_vec(),
        ..Default::default()
    };

    let header_end = find_header_end(raw).unwrap_or(raw.len());
    let header_text = header::decode_header_bytes(&raw[..header_end]);
    for (name, value) in header::unfold_headers(&header_text) {
        message.push_header(&name, value);
    }

    message.body_html = msg.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(body_bytes(msg, part, html)),
        _ => None,
    });
    message.body_text = msg
        .text_part(0)
        .and_then(|part| match &part.body {
            PartType::Text(text) => Some(body_bytes(msg, part, text)),
            _ => None,
        })
        .unwrap_or_default();

    message.attachments = msg
        .attachments()
        .map(|part| attachment_from_part(part, depth))
        .collect();

    debug!(
        headers = message.headers.len(),
        attachments = message.attachments.len(),
        has_html = message.body_html.is_some(),
        depth,
        "Adapted message"
    );

    message
}

/// Body bytes of a text part with the transfer encoding undone.
///
/// A declared charset other than UTF-8 or US-ASCII is converted to UTF-8 when
/// the bytes are valid in it. Everything else is left as-is so the body
/// normalizer sees the original bytes rather than text already patched with
/// replacement characters. `decoded` is used when the raw slice is unusable.
fn body_bytes(msg: &mail_parser::Message<'_>, part: &MessagePart<'_>, decoded: &str) -> Vec<u8> {
    let Some(raw) = msg
        .raw_message
        .get(part.raw_body_offset()..part.raw_end_offset())
    else {
        return decoded.as_bytes().to_vec();
    };

    let transfer = part
        .content_transfer_encoding()
        .map(|e| e.trim().to_ascii_lowercase());
    let bytes = match transfer.as_deref() {
        Some("base64") => {
            let compact: Vec<u8> = raw
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            match header::LENIENT_BASE64.decode(compact) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Undecodable base64 body, using parser text");
                    return decoded.as_bytes().to_vec();
                }
            }
        }
        Some("quoted-printable") => {
            match quoted_printable::decode(raw, quoted_printable::ParseMode::Robust) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Undecodable quoted-printable body, using parser text");
                    return decoded.as_bytes().to_vec();
                }
            }
        }
        _ => raw.to_vec(),
    };

    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(str::trim)
        .filter(|c| !c.eq_ignore_ascii_case("us-ascii") && !c.eq_ignore_ascii_case("ascii"));
    let Some(encoding) = charset.and_then(|c| encoding_rs::Encoding::for_label(c.as_bytes()))
    else {
        return bytes;
    };
    if encoding == encoding_rs::UTF_8 {
        return bytes;
    }
    match encoding.decode_without_bom_handling_and_without_replacement(&bytes) {
        Some(text) => text.into_owned().into_bytes(),
        None => {
            debug!(charset = encoding.name(), "Body not valid in its declared charset");
            bytes
        }
    }
}

fn attachment_from_part(part: &MessagePart<'_>, depth: usize) -> Attachment {
    let filename = part.attachment_name().map(String::from);

    let display_name = part
        .content_description()
        .map(String::from)
        .or_else(|| filename.clone());

    let content_id = part
        .content_id()
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .filter(|id| !id.is_empty());

    let mime_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_lowercase(),
            None => ct.ctype().to_lowercase(),
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let is_attachment_disposition = part
        .content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));

    // Inline parts addressed by content-id belong to the body, not the user.
    let hidden = content_id.is_some() && !is_attachment_disposition;

    let embedded = match &part.body {
        PartType::Message(nested) if depth < MAX_DEPTH => {
            Some(Box::new(from_parsed(nested, depth + 1)))
        }
        PartType::Message(_) => {
            warn!(depth, "Embedded message nesting too deep, keeping it as raw data");
            None
        }
        _ => None,
    };

    Attachment {
        filename,
        display_name,
        content_id,
        mime_type,
        hidden,
        data: part.contents().to_vec(),
        embedded,
    }
}

/// Find the byte offset where headers end (position of the first blank line).
pub(crate) fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}
