//! Body text repair: turn bytes of unknown encoding into valid UTF-8.
//!
//! The chain is strict UTF-8, then a strict decode with the fallback charset,
//! then lossy UTF-8. Only the last step produces a warning.

use encoding_rs::Encoding;
use tracing::{debug, warn};

/// Decoded body text plus the warning, if the lossy fallback was needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub warning: Option<String>,
}

/// Repairs body text with a bounded fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct EncodingNormalizer {
    fallback: &'static Encoding,
}

impl Default for EncodingNormalizer {
    /// ISO-8859-1, which `encoding_rs` treats as windows-1252.
    fn default() -> Self {
        Self {
            fallback: encoding_rs::WINDOWS_1252,
        }
    }
}

impl EncodingNormalizer {
    /// Use `fallback` as the second step of the chain.
    pub fn new(fallback: &'static Encoding) -> Self {
        Self { fallback }
    }

    /// Build from an encoding label such as `"iso-8859-1"` or `"shift_jis"`.
    ///
    /// Returns `None` for labels `encoding_rs` does not know.
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(Self::new)
    }

    /// The charset tried after UTF-8.
    pub fn fallback(&self) -> &'static Encoding {
        self.fallback
    }

    /// Decode `raw` into valid Unicode. Never fails.
    pub fn normalize(&self, raw: &[u8]) -> Normalized {
        let utf8_err = match std::str::from_utf8(raw) {
            Ok(text) => {
                return Normalized {
                    text: normalize_newlines(text),
                    warning: None,
                }
            }
            Err(e) => e,
        };

        if let Some(text) = self
            .fallback
            .decode_without_bom_handling_and_without_replacement(raw)
        {
            debug!(
                charset = self.fallback.name(),
                "Body is not UTF-8, decoded with fallback charset"
            );
            return Normalized {
                text: normalize_newlines(&text),
                warning: None,
            };
        }

        let message = format!(
            "Body is neither valid UTF-8 nor {}: {utf8_err}",
            self.fallback.name()
        );
        warn!(error = %utf8_err, "Replacing undecodable body bytes");
        Normalized {
            text: normalize_newlines(&String::from_utf8_lossy(raw)),
            warning: Some(message),
        }
    }
}

/// Convert CRLF and lone CR line endings to LF.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}
