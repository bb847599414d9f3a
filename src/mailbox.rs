//! Mailbox capability surface.
//!
//! The engine programs against `MailboxClient`; the wire-level IMAP client
//! lives behind it. Fetch operations stream their results through a bounded
//! channel so the caller can consume while the fetch is still in flight —
//! the fetch's own status is checked only after the channel drains.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::MailboxError;

/// Stable, mailbox-scoped unique reference to a message.
pub type Uid = u32;

/// The canonical system flag applied when a `flag` action names none.
pub const FLAGGED: &str = "\\Flagged";

/// Envelope summary fetched during the match phase.
#[derive(Debug, Clone, Default)]
pub struct MessageSummary {
    pub uid: Uid,
    /// Addresses in the To header list.
    pub to: Vec<String>,
    /// Addresses in the From header list.
    pub from: Vec<String>,
    pub subject: String,
    /// Flags currently set on the message.
    pub flags: Vec<String>,
}

/// Full transfer-syntax bytes of one message.
#[derive(Debug, Clone)]
pub struct MessageBody {
    pub uid: Uid,
    pub raw: Vec<u8>,
}

/// A mailbox-change notification from the idle subscription.
#[derive(Debug, Clone)]
pub struct MailboxUpdate {
    /// Name of the mailbox that changed.
    pub mailbox: String,
}

/// Whether a flag mutation adds or removes the named flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    Add,
    Remove,
}

/// Capability surface required from the mailbox collaborator.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Stream an envelope summary for every message in `mailbox` into `tx`.
    /// Finite, one pass per scan.
    async fn fetch_summaries(
        &self,
        mailbox: &str,
        tx: mpsc::Sender<MessageSummary>,
    ) -> Result<(), MailboxError>;

    /// Stream the full body of each listed message into `tx`. Finite.
    async fn fetch_bodies(
        &self,
        uids: &[Uid],
        tx: mpsc::Sender<MessageBody>,
    ) -> Result<(), MailboxError>;

    /// Move the listed messages to `mailbox` in one batched request.
    async fn move_messages(&self, uids: &[Uid], mailbox: &str) -> Result<(), MailboxError>;

    /// Add or remove `flag` on the listed messages in one batched request.
    async fn store_flags(&self, uids: &[Uid], op: FlagOp, flag: &str) -> Result<(), MailboxError>;

    /// Block until `stop` fires or the subscription ends on its own,
    /// pushing change notifications into `tx` as they arrive.
    async fn idle(
        &self,
        tx: mpsc::Sender<MailboxUpdate>,
        stop: oneshot::Receiver<()>,
    ) -> Result<(), MailboxError>;
}
