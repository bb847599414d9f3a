//! Orchestration loop: scan once, block on a mailbox-change notification,
//! scan again.
//!
//! The idle subscription runs as its own task purely so the loop can
//! select between "a relevant notification arrived" and "the subscription
//! call itself returned" without busy-waiting. The stop signal is a
//! oneshot fired exactly once; after it the idle task is expected to
//! return, and its status is always collected.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::MailboxError;
use crate::mailbox::MailboxClient;

const UPDATE_BUFFER: usize = 10;

/// Drive the engine forever: `Scanning → WaitingForNotification → …`,
/// starting with one unconditional scan.
///
/// Connection-level failures — a failed fetch or an error from the idle
/// subscription itself — are returned and terminate the loop. Per-rule and
/// per-message failures are handled inside the scan and never reach here.
pub async fn run(engine: &mut Engine) -> Result<(), MailboxError> {
    let client = engine.client();
    loop {
        info!(mailbox = %engine.mailbox(), "scanning");
        engine.scan().await?;

        info!(mailbox = %engine.mailbox(), "listening for changes");
        wait_for_change(&client, engine.mailbox()).await?;
    }
}

/// Block until the watched mailbox changes, then unsubscribe.
///
/// First relevant notification wins; notifications for other mailboxes are
/// ignored. If the subscription returns on its own, its status decides
/// whether the caller rescans (`Ok`) or dies (`Err`).
async fn wait_for_change(
    client: &Arc<dyn MailboxClient>,
    mailbox: &str,
) -> Result<(), MailboxError> {
    let (stop_tx, stop_rx) = oneshot::channel();
    let (tx, mut rx) = mpsc::channel(UPDATE_BUFFER);
    let idle_client = Arc::clone(client);
    let mut idle = tokio::spawn(async move { idle_client.idle(tx, stop_rx).await });

    let mut stop_tx = Some(stop_tx);
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) if update.mailbox == mailbox => {
                    debug!(mailbox = %mailbox, "saw change to watched mailbox");
                    if let Some(stop) = stop_tx.take() {
                        let _ = stop.send(());
                    }
                    break;
                }
                Some(update) => {
                    debug!(mailbox = %update.mailbox, "ignoring change to other mailbox");
                }
                // Notification stream closed without returning yet; stop
                // the subscription and collect its status below.
                None => {
                    if let Some(stop) = stop_tx.take() {
                        let _ = stop.send(());
                    }
                    break;
                }
            },
            result = &mut idle => {
                // The subscription returned before any relevant
                // notification arrived.
                return match result {
                    Ok(status) => status,
                    Err(err) => Err(MailboxError::Task(err.to_string())),
                };
            }
        }
    }

    match idle.await {
        Ok(status) => status,
        Err(err) => Err(MailboxError::Task(err.to_string())),
    }
}
