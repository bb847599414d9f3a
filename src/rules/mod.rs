//! Rule AST: the four action variants and their private matching state.
//!
//! Each rule pairs a predicate with a pending set of UIDs accumulated
//! during the current scan. The engine is the single owner of all rule
//! state — match and action phases never overlap for one rule — so pending
//! and done sets are plain owned fields, no locking.

pub mod predicate;

pub use predicate::{Field, Predicate, StringMatcher};

use std::collections::HashSet;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::delivery::{Deliverer, StreamContent};
use crate::engine::FETCH_BUFFER;
use crate::error::MailboxError;
use crate::mailbox::{FlagOp, MailboxClient, MessageSummary, Uid};

/// A filtering rule: predicate plus action-specific configuration.
///
/// The variant set is closed by the grammar, so every operation is an
/// exhaustive match.
#[derive(Debug)]
pub enum Rule {
    Move(MoveRule),
    Flag(FlagRule),
    Unflag(UnflagRule),
    Stream(StreamRule),
}

#[derive(Debug)]
pub struct MoveRule {
    pub predicate: Predicate,
    pub mailbox: String,
    pending: HashSet<Uid>,
}

#[derive(Debug)]
pub struct FlagRule {
    pub predicate: Predicate,
    pub flag: String,
    pending: HashSet<Uid>,
}

#[derive(Debug)]
pub struct UnflagRule {
    pub predicate: Predicate,
    pub flag: String,
    pending: HashSet<Uid>,
}

#[derive(Debug)]
pub struct StreamRule {
    pub predicate: Predicate,
    pub content: StreamContent,
    pub target: String,
    /// Secondary endpoint accepted by the grammar; delivery targets the
    /// primary only.
    pub secondary: Option<String>,
    pending: HashSet<Uid>,
    /// UIDs already taken for a delivery pass. Grows for the process
    /// lifetime, never cleared, never persisted.
    done: HashSet<Uid>,
    deliverer: Deliverer,
}

impl Rule {
    pub fn new_move(predicate: Predicate, mailbox: String) -> Self {
        Rule::Move(MoveRule {
            predicate,
            mailbox,
            pending: HashSet::new(),
        })
    }

    pub fn new_flag(predicate: Predicate, flag: Option<String>, default_flag: &str) -> Self {
        Rule::Flag(FlagRule {
            predicate,
            flag: resolve_flag(flag, default_flag),
            pending: HashSet::new(),
        })
    }

    pub fn new_unflag(predicate: Predicate, flag: Option<String>, default_flag: &str) -> Self {
        Rule::Unflag(UnflagRule {
            predicate,
            flag: resolve_flag(flag, default_flag),
            pending: HashSet::new(),
        })
    }

    pub fn new_stream(
        predicate: Predicate,
        content: StreamContent,
        target: String,
        secondary: Option<String>,
        deliverer: Deliverer,
    ) -> Self {
        Rule::Stream(StreamRule {
            predicate,
            content,
            target,
            secondary,
            pending: HashSet::new(),
            done: HashSet::new(),
            deliverer,
        })
    }

    /// Match-phase step: inspect one message and possibly record its UID
    /// in the pending set. Side effects stay inside this rule.
    pub fn on_message(&mut self, msg: &MessageSummary) {
        match self {
            Rule::Move(r) => {
                if r.predicate.matches(msg) {
                    debug!(uid = msg.uid, mailbox = %r.mailbox, "queueing move");
                    r.pending.insert(msg.uid);
                }
            }
            Rule::Flag(r) => {
                if has_flag(msg, &r.flag) {
                    return; // already flagged
                }
                if r.predicate.matches(msg) {
                    debug!(uid = msg.uid, flag = %r.flag, "queueing flag");
                    r.pending.insert(msg.uid);
                }
            }
            Rule::Unflag(r) => {
                if has_flag(msg, &r.flag) {
                    return; // already flagged
                }
                if r.predicate.matches(msg) {
                    debug!(uid = msg.uid, flag = %r.flag, "queueing unflag");
                    r.pending.insert(msg.uid);
                }
            }
            Rule::Stream(r) => {
                if r.done.contains(&msg.uid) {
                    return; // delivery already attempted
                }
                if r.predicate.matches(msg) {
                    debug!(uid = msg.uid, target = %r.target, "queueing stream");
                    r.pending.insert(msg.uid);
                }
            }
        }
    }

    /// Action-phase step: take the pending set and issue one batched
    /// mutation, or the per-message deliveries for a stream rule.
    pub async fn act(&mut self, client: &Arc<dyn MailboxClient>) -> Result<(), MailboxError> {
        match self {
            Rule::Move(r) => {
                let Some(uids) = take_pending(&mut r.pending) else {
                    return Ok(());
                };
                client
                    .move_messages(&uids, &r.mailbox)
                    .await
                    .map_err(|err| MailboxError::Move {
                        mailbox: r.mailbox.clone(),
                        reason: err.to_string(),
                    })
            }
            Rule::Flag(r) => {
                let Some(uids) = take_pending(&mut r.pending) else {
                    return Ok(());
                };
                client
                    .store_flags(&uids, FlagOp::Add, &r.flag)
                    .await
                    .map_err(|err| MailboxError::Store {
                        flag: r.flag.clone(),
                        reason: err.to_string(),
                    })
            }
            Rule::Unflag(r) => {
                let Some(uids) = take_pending(&mut r.pending) else {
                    return Ok(());
                };
                client
                    .store_flags(&uids, FlagOp::Remove, &r.flag)
                    .await
                    .map_err(|err| MailboxError::Store {
                        flag: r.flag.clone(),
                        reason: err.to_string(),
                    })
            }
            Rule::Stream(r) => r.act(client).await,
        }
    }
}

impl StreamRule {
    async fn act(&mut self, client: &Arc<dyn MailboxClient>) -> Result<(), MailboxError> {
        let pending = mem::take(&mut self.pending);
        // UIDs are done as soon as they are taken for an action pass:
        // failed deliveries are not retried.
        self.done.extend(pending.iter().copied());
        let mut uids: Vec<Uid> = pending.into_iter().collect();
        if uids.is_empty() {
            return Ok(());
        }
        uids.sort_unstable();

        let (tx, mut rx) = mpsc::channel(FETCH_BUFFER);
        let fetch_client = Arc::clone(client);
        let fetch_uids = uids.clone();
        let fetch =
            tokio::spawn(async move { fetch_client.fetch_bodies(&fetch_uids, tx).await });

        while let Some(body) = rx.recv().await {
            // One message failing does not stop the rest of the batch.
            if let Err(err) = self
                .deliverer
                .deliver(self.content, &self.target, &body)
                .await
            {
                warn!(uid = body.uid, target = %self.target, error = %err, "stream delivery failed");
            }
        }

        match fetch.await {
            Ok(result) => result,
            Err(err) => Err(MailboxError::Task(err.to_string())),
        }
    }
}

fn resolve_flag(flag: Option<String>, default_flag: &str) -> String {
    flag.filter(|f| !f.is_empty())
        .unwrap_or_else(|| default_flag.to_string())
}

fn has_flag(msg: &MessageSummary, flag: &str) -> bool {
    msg.flags.iter().any(|f| f == flag)
}

/// Swap the pending set for an empty one. `None` means nothing matched
/// this scan. UIDs come back sorted so batch requests are deterministic.
fn take_pending(pending: &mut HashSet<Uid>) -> Option<Vec<Uid>> {
    let taken = mem::take(pending);
    if taken.is_empty() {
        return None;
    }
    let mut uids: Vec<Uid> = taken.into_iter().collect();
    uids.sort_unstable();
    Some(uids)
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Move(r) => write!(f, "if {} then move \"{}\"", r.predicate, r.mailbox),
            Rule::Flag(r) => write!(f, "if {} then flag \"{}\"", r.predicate, r.flag),
            Rule::Unflag(r) => write!(f, "if {} then unflag \"{}\"", r.predicate, r.flag),
            Rule::Stream(r) => {
                write!(
                    f,
                    "if {} then stream {} \"{}\"",
                    r.predicate, r.content, r.target
                )?;
                if let Some(secondary) = &r.secondary {
                    write!(f, " \"{secondary}\"")?;
                }
                Ok(())
            }
        }
    }
}
