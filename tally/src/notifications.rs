//! Bill notifications.
//!
//! After a unit of work commits, the recorded bills are offered to a [`Notifier`] (for example
//! to send a "balance changed" SMS). Delivery is best effort: failures are logged and never
//! undo or fail the change that produced the bill.
//!
//! [`ChannelNotifier`] decouples callers from slow downstream notifiers through a bounded queue
//! drained by [`run_notification_worker`].

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NotificationsConfig;
use crate::db::models::ledger::LedgerEntryDBResponse;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, entry: &LedgerEntryDBResponse) -> anyhow::Result<()>;
}

/// Emits one structured log line per bill
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, entry: &LedgerEntryDBResponse) -> anyhow::Result<()> {
        tracing::info!(
            entry_id = entry.id,
            entity_id = entry.entity_id,
            category = %entry.category,
            direction = %entry.direction,
            bill_type = %entry.bill_type,
            amount = %entry.amount,
            balance = %entry.balance,
            "Bill recorded"
        );
        Ok(())
    }
}

/// Queues bills for [`run_notification_worker`]. Never blocks: a full queue drops the bill.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<LedgerEntryDBResponse>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LedgerEntryDBResponse>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, entry: &LedgerEntryDBResponse) -> anyhow::Result<()> {
        self.sender.try_send(entry.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow!("notification queue is full"),
            mpsc::error::TrySendError::Closed(_) => anyhow!("notification worker has stopped"),
        })
    }
}

/// Forward queued bills to `downstream` until the queue closes or `shutdown` fires.
pub async fn run_notification_worker(
    mut receiver: mpsc::Receiver<LedgerEntryDBResponse>,
    downstream: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) {
    tracing::info!("Starting bill notification worker");

    loop {
        tokio::select! {
            received = receiver.recv() => {
                let Some(entry) = received else {
                    tracing::info!("Notification queue closed, stopping worker");
                    return;
                };
                if let Err(e) = downstream.notify(&entry).await {
                    tracing::warn!(entry_id = entry.id, error = %e, "Failed to deliver bill notification");
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("Bill notification worker shutting down");
                return;
            }
        }
    }
}

/// Offers committed bills to a notifier, filtered by the configured categories.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
    config: NotificationsConfig,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>, config: NotificationsConfig) -> Self {
        Self { notifier, config }
    }

    pub fn disabled() -> Self {
        Self {
            notifier: Arc::new(LogNotifier),
            config: NotificationsConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }

    pub async fn dispatch(&self, entries: &[LedgerEntryDBResponse]) {
        for entry in entries.iter().filter(|entry| self.config.wants(entry.category)) {
            if let Err(e) = self.notifier.notify(entry).await {
                tracing::warn!(
                    entry_id = entry.id,
                    entity_id = entry.entity_id,
                    category = %entry.category,
                    error = %e,
                    "Dropped bill notification"
                );
            }
        }
    }
}
