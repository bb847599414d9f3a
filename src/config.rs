//! Environment-driven configuration.

use std::time::Duration;

use crate::delivery::DEFAULT_STREAM_TIMEOUT;
use crate::mailbox::FLAGGED;
use crate::parse::ParseOptions;

/// Filter process configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the rule file.
    pub rules_file: String,
    /// Mailbox to watch.
    pub mailbox: String,
    /// Flag applied by `flag`/`unflag` actions that name none.
    pub default_flag: String,
    /// Per-message deadline for stream deliveries.
    pub stream_timeout: Duration,
}

impl Config {
    /// Build config from environment variables.
    /// Returns `None` if `MAILRULES_RULES_FILE` is not set.
    pub fn from_env() -> Option<Self> {
        let rules_file = std::env::var("MAILRULES_RULES_FILE").ok()?;

        let mailbox = std::env::var("MAILRULES_MAILBOX").unwrap_or_else(|_| "INBOX".to_string());

        let default_flag =
            std::env::var("MAILRULES_DEFAULT_FLAG").unwrap_or_else(|_| FLAGGED.to_string());

        let stream_timeout = std::env::var("MAILRULES_STREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STREAM_TIMEOUT);

        Some(Self {
            rules_file,
            mailbox,
            default_flag,
            stream_timeout,
        })
    }

    /// Options applied while constructing rules during the parse.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_flag: self.default_flag.clone(),
            stream_timeout: self.stream_timeout,
        }
    }
}
