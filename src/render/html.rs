//! HTML document templates and header-table injection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::header::Headers;

const PLAIN_WRAPPER_PREFIX: &[u8] =
    b"<!DOCTYPE html><html><head><style>body {font-size: 0.5cm;}</style><title>title</title></head><body>";
const PLAIN_WRAPPER_SUFFIX: &[u8] = b"</body></html>";

/// Table styling plus a script that reports the document height to an embedding frame.
pub const HEADER_STYLE: &str = concat!(
    "<style>",
    ".header-table {margin: 0 0 20px 0;padding: 0;font-family: Arial, Helvetica, sans-serif;}",
    ".header-name {padding-right: 5px;color: #9E9E9E;text-align: right;vertical-align: top;font-size: 12px;}",
    ".header-value {font-size: 12px;}",
    "#header_fields {background: white;margin: 0;border: 1px solid #DDD;border-radius: 3px;padding: 8px;width: 100%;box-sizing: border-box;}",
    "</style>",
    "<script type=\"text/javascript\">",
    "function notifyHeight() {try {parent.postMessage(Math.max(document.body.offsetHeight, document.body.scrollHeight), '*');} catch (e) {}setTimeout(notifyHeight, 10);};notifyHeight();",
    "</script>"
);

static RE_HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head>").unwrap());
static RE_BODY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[^>]*>").unwrap());

/// Wrap a plain-text body in a minimal HTML document.
///
/// Works on raw bytes because the body's encoding is repaired afterwards.
pub fn wrap_plain_body(text: &[u8]) -> Vec<u8> {
    let mut doc =
        Vec::with_capacity(PLAIN_WRAPPER_PREFIX.len() + text.len() + PLAIN_WRAPPER_SUFFIX.len());
    doc.extend_from_slice(PLAIN_WRAPPER_PREFIX);
    doc.extend_from_slice(text);
    doc.extend_from_slice(PLAIN_WRAPPER_SUFFIX);
    doc
}

/// Render the header table rows. Empty values are skipped.
pub fn header_rows(headers: &Headers) -> String {
    headers
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| {
            format!(
                "<tr><td class=\"header-name\">{label}</td><td class=\"header-value\">{}</td></tr>",
                escape_html(value)
            )
        })
        .collect()
}

/// Insert the header style block and table into an HTML document.
///
/// The style goes before `</head>`, or into a new `<head>` placed before
/// `<body`. The table becomes the first child of `<body>`. Nothing is
/// inserted when there are no rows.
pub fn inject_headers(html: &str, headers: &Headers) -> String {
    if headers.is_empty() {
        return html.to_string();
    }
    let rows = header_rows(headers);
    let table = format!(
        "<div class=\"header-table\"><table id=\"header_fields\"><tbody>{rows}</tbody></table></div>"
    );

    let Some(body_tag) = RE_BODY_TAG.find(html) else {
        // Fragment without a <body>: lead with the header block.
        return format!("{HEADER_STYLE}{table}{html}");
    };
    let mut out = String::with_capacity(html.len() + HEADER_STYLE.len() + table.len() + 13);

    match RE_HEAD_CLOSE.find(html) {
        Some(head_close) if head_close.start() < body_tag.start() => {
            out.push_str(&html[..head_close.start()]);
            out.push_str(HEADER_STYLE);
            out.push_str(&html[head_close.start()..body_tag.end()]);
        }
        _ => {
            out.push_str(&html[..body_tag.start()]);
            out.push_str("<head>");
            out.push_str(HEADER_STYLE);
            out.push_str("</head>");
            out.push_str(body_tag.as_str());
        }
    }
    out.push_str(&table);
    out.push_str(&html[body_tag.end()..]);
    out
}

/// Escape text for use inside HTML element content or attribute values.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
