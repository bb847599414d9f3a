//! Batching rule-execution engine.
//!
//! One scan is two phases. Match phase: every fetched message runs through
//! every rule in declaration order (outer loop message, inner loop rule),
//! accumulating UIDs in the rules' pending sets. Action phase: every rule
//! fires once, swapping out its pending set and issuing one batched
//! mutation.
//!
//! The engine is the single owner of all rule state; nothing else touches
//! a rule's pending or done sets, which is what lets them stay lock-free.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::MailboxError;
use crate::mailbox::MailboxClient;
use crate::rules::Rule;

/// Capacity of the bounded buffer between a fetch task and its consumer.
pub(crate) const FETCH_BUFFER: usize = 10;

pub struct Engine {
    rules: Vec<Rule>,
    mailbox: String,
    client: Arc<dyn MailboxClient>,
}

impl Engine {
    /// Rule order is fixed here for the process lifetime and defines both
    /// match-phase and action-phase iteration order.
    pub fn new(rules: Vec<Rule>, mailbox: impl Into<String>, client: Arc<dyn MailboxClient>) -> Self {
        Self {
            rules,
            mailbox: mailbox.into(),
            client,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    pub fn client(&self) -> Arc<dyn MailboxClient> {
        Arc::clone(&self.client)
    }

    /// Run one full scan.
    ///
    /// Fetch failures are connection-level and fatal to the scan. Rule
    /// action failures are isolated: they are logged and the remaining
    /// rules' actions still run.
    pub async fn scan(&mut self) -> Result<(), MailboxError> {
        let (tx, mut rx) = mpsc::channel(FETCH_BUFFER);
        let client = Arc::clone(&self.client);
        let mailbox = self.mailbox.clone();
        let fetch = tokio::spawn(async move { client.fetch_summaries(&mailbox, tx).await });

        let mut seen = 0usize;
        while let Some(summary) = rx.recv().await {
            seen += 1;
            for rule in &mut self.rules {
                rule.on_message(&summary);
            }
        }
        debug!(mailbox = %self.mailbox, messages = seen, "match phase complete");

        // Fetch status is checked only after the buffer drains.
        match fetch.await {
            Ok(result) => result?,
            Err(err) => return Err(MailboxError::Task(err.to_string())),
        }

        for rule in &mut self.rules {
            if let Err(err) = rule.act(&self.client).await {
                warn!(rule = %rule, error = %err, "rule action failed");
            }
        }
        Ok(())
    }
}
