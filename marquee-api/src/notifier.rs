use async_trait::async_trait;
use marquee_core::{CoreResult, Notifier};
use marquee_shared::BookingEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Forwards every event to the configured notifier and fans it out to
/// connected SSE subscribers.
pub struct BroadcastNotifier {
    inner: Arc<dyn Notifier>,
    tx: broadcast::Sender<BookingEvent>,
}

impl BroadcastNotifier {
    pub fn new(inner: Arc<dyn Notifier>, tx: broadcast::Sender<BookingEvent>) -> Self {
        Self { inner, tx }
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &BookingEvent) -> CoreResult<()> {
        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
        self.inner.notify(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::LogNotifier;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_event_reaches_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let notifier = BroadcastNotifier::new(Arc::new(LogNotifier), tx);
        let event = BookingEvent::BookingRejected {
            booking_id: Uuid::new_v4(),
            celebrity_id: Uuid::new_v4(),
            reason: "calendar hold".to_string(),
            timestamp: 0,
        };

        notifier.notify(&event).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
