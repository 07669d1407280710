//! Rendering: body encoding repair, HTML finalization, inline images, and PDF output.

pub mod encoding;
pub mod html;
pub mod inline;
pub mod pdf;
