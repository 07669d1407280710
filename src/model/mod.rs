//! Core data model types: messages, attachments, and conversion outcomes.

pub mod message;
pub mod outcome;
