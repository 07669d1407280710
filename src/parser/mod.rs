//! Message input: `.eml` loading, MIME adaptation, and header decoding.

pub mod eml;
pub mod header;
pub mod mime;
