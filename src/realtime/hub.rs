use tokio::sync::broadcast;
use tracing::debug;

use crate::models::Notification;

const HUB_CAPACITY: usize = 256;

/// In-process fan-out of freshly created notifications. Every socket
/// subscribes and keeps only its own user's events.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Returns the number of live subscribers that received it.
    pub fn publish(&self, notification: Notification) -> usize {
        let user_id = notification.user_id;
        // No subscribers is not an error; the row is already stored.
        let delivered = self.sender.send(notification).unwrap_or(0);
        debug!(user_id, delivered, "Published notification");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
