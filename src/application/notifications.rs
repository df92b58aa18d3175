use crate::domain::ports::{Notification, NotifierRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Queue of notifications emitted after a state transition has been saved.
///
/// Delivery happens on a background task. A failing or slow notifier never
/// reaches the workflow that emitted the notification.
#[derive(Clone)]
pub struct NotificationOutbox {
    sender: mpsc::UnboundedSender<Notification>,
}

/// Handle to the task draining a [`NotificationOutbox`].
pub struct OutboxWorker {
    handle: JoinHandle<()>,
}

impl NotificationOutbox {
    /// Spawns the delivery task on the current tokio runtime.
    pub fn start(notifier: NotifierRef) -> (Self, OutboxWorker) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Notification>();
        let handle = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                match notifier.notify(&notification).await {
                    Ok(()) => debug!(kind = ?notification.kind, recipient = notification.recipient, "notification delivered"),
                    Err(e) => warn!(
                        kind = ?notification.kind,
                        recipient = notification.recipient,
                        error = %e,
                        "notification delivery failed"
                    ),
                }
            }
        });
        (Self { sender }, OutboxWorker { handle })
    }

    pub fn emit(&self, notification: Notification) {
        if let Err(e) = self.sender.send(notification) {
            warn!(kind = ?e.0.kind, "notification outbox is closed, dropping notification");
        }
    }
}

impl OutboxWorker {
    /// Waits until every outbox clone is dropped and the queue is empty.
    pub async fn drained(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "notification worker terminated abnormally");
        }
    }
}
