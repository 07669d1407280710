//! `mailconvert` — converts email messages to EML, HTML or PDF.
//!
//! This crate provides the core library for parsing `.eml` messages,
//! decoding their headers and bodies, resolving inline images, and writing
//! the converted output together with numbered attachment files.

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod render;
