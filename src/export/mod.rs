//! Export functionality: attachment naming/extraction and output file writing.

pub mod attachment;
pub mod writer;
