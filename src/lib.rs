//! mailrules — continuous mailbox filtering driven by a small rule language.
//!
//! Data flow: rule text → tokens → rules → [per scan: messages → match →
//! act → mailbox mutations] → wait for a mailbox change → repeat.

pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod parse;
pub mod rules;
pub mod watch;
