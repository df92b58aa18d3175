use crate::domain::ports::{Notification, Notifier};
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Writes notifications to the log instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            kind = ?notification.kind,
            recipient = notification.recipient,
            context = ?notification.context,
            "notification"
        );
        Ok(())
    }
}
