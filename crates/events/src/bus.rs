//! Fan-out of chunk notifications to the client side

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::{Notification, NotificationEnvelope};

/// Envelopes a lagging listener may fall behind by before it starts
/// missing them.
const BACKLOG: usize = 1000;

/// Stamps each notification with an id and time and hands it to every
/// current listener. Clones share one channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEnvelope>,
    published: Arc<AtomicUsize>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_backlog(BACKLOG)
    }

    pub fn with_backlog(backlog: usize) -> Self {
        let (sender, _) = broadcast::channel(backlog);
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns how many listeners the envelope reached; with none
    /// attached it is counted and discarded.
    pub fn publish(&self, notification: Notification) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let envelope = NotificationEnvelope::new(notification);
        match self.sender.send(envelope) {
            Ok(reached) => reached,
            Err(broadcast::error::SendError(dropped)) => {
                tracing::trace!(id = %dropped.id, "No listeners for notification");
                0
            }
        }
    }

    /// Listeners only see envelopes published after they attach.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEnvelope> {
        self.sender.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total published through this bus or any of its clones.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebook_core::{ChannelType, ChunkId, DocumentId};

    fn console_text(text: &str) -> Notification {
        Notification::LiveConsoleOutput {
            document_id: DocumentId::new("doc1").unwrap(),
            chunk_id: ChunkId::new("c1").unwrap(),
            channel_type: ChannelType::Output,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_listener_receives_envelope() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish(console_text("hello")), 1);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.notification, console_text("hello"));
    }

    #[tokio::test]
    async fn test_every_listener_sees_same_envelope() {
        let bus = NotificationBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(console_text("x")), 2);

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.timestamp, b.timestamp);
    }

    #[test]
    fn test_publish_without_listeners_is_counted() {
        let bus = NotificationBus::new();

        assert_eq!(bus.publish(console_text("dropped")), 0);
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn test_clones_share_channel_and_count() {
        let bus = NotificationBus::new();
        let clone = bus.clone();

        let _rx = clone.subscribe();
        clone.publish(console_text("a"));

        assert_eq!(bus.listeners(), 1);
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_late_listener_misses_earlier_envelopes() {
        let bus = NotificationBus::new();
        let _early = bus.subscribe();
        bus.publish(console_text("before"));

        let mut late = bus.subscribe();
        bus.publish(console_text("after"));

        let envelope = late.recv().await.unwrap();
        assert_eq!(envelope.notification, console_text("after"));
    }
}
