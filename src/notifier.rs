//! UI notification hook
//!
//! The session pushes short human readable status lines ("paused", "finished"
//! and so on) through a [`Notifier`]. Delivery is fire-and-forget: a failed
//! notification is logged and dropped, it never fails the playback operation
//! that produced it.

use thiserror::Error;
use tokio::sync::mpsc;

/// Notification delivery failure
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification receiver is gone")]
    Closed,
}

/// Sink for user-facing status messages
pub trait Notifier: Send + Sync {
    /// Deliver a message without blocking
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sender half for notifications
pub type NotificationSender = mpsc::UnboundedSender<String>;

/// Receiver half for notifications (held by the UI)
pub type NotificationReceiver = mpsc::UnboundedReceiver<String>;

/// Notifier that forwards messages over a channel to the UI loop
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: NotificationSender,
}

impl ChannelNotifier {
    pub fn new(tx: NotificationSender) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| NotifyError::Closed)
    }
}

/// Create a notifier together with the receiver the UI drains
pub fn notification_channel() -> (ChannelNotifier, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelNotifier::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = notification_channel();
        notifier.notify("已暂停: a - b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "已暂停: a - b");
    }

    #[test]
    fn test_channel_notifier_reports_closed_receiver() {
        let (notifier, rx) = notification_channel();
        drop(rx);
        assert!(matches!(notifier.notify("x"), Err(NotifyError::Closed)));
    }
}
