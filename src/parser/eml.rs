//! Loader for `.eml` files (RFC 5322 messages).

use std::path::Path;

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::model::message::Message;
use crate::parser::mime;

/// Read and parse a single `.eml` file.
pub fn load_message(path: impl AsRef<Path>) -> Result<Message> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConvertError::MessageNotFound(path.to_path_buf())
        } else {
            ConvertError::io(path, e)
        }
    })?;

    debug!(path = %path.display(), bytes = data.len(), "Loaded message file");

    // Strip a BOM and a leading mbox "From " line so single-message exports load too.
    let bytes = skip_from_line(&data);
    mime::parse_message(bytes).ok_or_else(|| ConvertError::InvalidMessage(path.to_path_buf()))
}

/// Skip a BOM and the `From ` separator line some tools prepend to exported messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
