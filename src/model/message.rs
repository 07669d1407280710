//! Owned, read-only message model consumed by the conversion pipeline.
//!
//! A [`Message`] is built once by the parser and never mutated afterwards.
//! Bodies are kept as raw bytes because their encoding is only repaired at
//! render time.

/// A header field value as stored in the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// The header appeared once.
    Single(String),
    /// The header appeared several times, values in order of appearance.
    List(Vec<String>),
}

impl HeaderValue {
    /// The first value, which is the one used for display.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(v) => Some(v.as_str()),
            Self::List(values) => values.first().map(String::as_str),
        }
    }
}

/// A single header field with its name in original case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: HeaderValue,
}

/// A complete message: headers, bodies, attachments and the raw MIME text.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Header fields in order of first appearance.
    pub headers: Vec<HeaderField>,
    /// Plain-text body bytes (empty when the message has none).
    pub body_text: Vec<u8>,
    /// HTML body bytes, if the message carries an HTML part.
    pub body_html: Option<Vec<u8>>,
    /// Attachments in document order.
    pub attachments: Vec<Attachment>,
    /// The full MIME representation of the message.
    pub raw_mime: Vec<u8>,
}

impl Message {
    /// Find a header field by name, ignoring ASCII case. The first match wins.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }

    /// Append a header value, turning an existing field into a list.
    pub fn push_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(field) = self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            field.value = match std::mem::replace(&mut field.value, HeaderValue::List(Vec::new()))
            {
                HeaderValue::Single(prev) => HeaderValue::List(vec![prev, value]),
                HeaderValue::List(mut values) => {
                    values.push(value);
                    HeaderValue::List(values)
                }
            };
        } else {
            self.headers.push(HeaderField {
                name: name.to_string(),
                value: HeaderValue::Single(value),
            });
        }
    }

    /// Look up an attachment by exact content-id.
    pub fn attachment_by_content_id(&self, cid: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.content_id.as_deref() == Some(cid))
    }
}

/// An attachment of a [`Message`].
///
/// The payload is held in memory so it can be read any number of times
/// (once for inline embedding, again for extraction).
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name from the part headers.
    pub filename: Option<String>,
    /// Human-readable name, used for embedded messages and warnings.
    pub display_name: Option<String>,
    /// Content-ID without surrounding angle brackets.
    pub content_id: Option<String>,
    /// MIME type (e.g. `"image/png"`).
    pub mime_type: String,
    /// Hidden attachments are skipped by extraction and naming.
    pub hidden: bool,
    /// Decoded payload.
    pub data: Vec<u8>,
    /// Set when the attachment is itself a message.
    pub embedded: Option<Box<Message>>,
}

impl Default for Attachment {
    fn default() -> Self {
        Self {
            filename: None,
            display_name: None,
            content_id: None,
            mime_type: "application/octet-stream".to_string(),
            hidden: false,
            data: Vec::new(),
            embedded: None,
        }
    }
}
