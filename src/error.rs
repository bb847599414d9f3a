//! Error types for mailrules.

use crate::mailbox::Uid;

/// Top-level error type for the filter process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Rule parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while lexing or parsing a rule file.
///
/// Parsing is all-or-nothing: any of these aborts the whole parse and no
/// rules are returned. Callers treat them as fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Unterminated string, illegal escape, or an unrecognized character.
    #[error("Malformed input at offset {pos}")]
    Lex { pos: usize },

    #[error("{message} near offset {pos}")]
    Syntax { message: String, pos: usize },

    #[error("Unknown field '{field}'")]
    UnknownField { field: String },

    #[error("Invalid pattern \"{pattern}\": {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors surfaced by the mailbox-client collaborator.
///
/// Connection-level failures (connect, login, idle) are fatal to the
/// process; mutation failures are isolated to the rule that issued them.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Move to mailbox '{mailbox}' failed: {reason}")]
    Move { mailbox: String, reason: String },

    #[error("Flag update '{flag}' failed: {reason}")]
    Store { flag: String, reason: String },

    #[error("Idle subscription failed: {0}")]
    Idle(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Per-message stream delivery errors.
///
/// Always isolated to one message: the rest of the batch is still
/// attempted and the message stays in the rule's done set (no retry).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Message {uid} could not be parsed as a mail document")]
    Unparseable { uid: Uid },

    #[error("Message {uid}: expected multipart message but found {found}")]
    NotMultipart { uid: Uid, found: String },

    #[error("Message {uid} has no text/html part")]
    NoHtmlPart { uid: Uid },

    #[error("Message {uid} has no parseable Date header")]
    MissingDate { uid: Uid },

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error response from {url}: {status}")]
    Status { url: String, status: u16 },
}

/// Result type alias for the filter process.
pub type Result<T> = std::result::Result<T, Error>;
