use async_trait::async_trait;
use marquee_shared::BookingEvent;

use crate::CoreResult;

/// Hand-off point to the notification subsystem. Delivery is its concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BookingEvent) -> CoreResult<()>;
}

/// Writes events to the log only. Used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BookingEvent) -> CoreResult<()> {
        tracing::info!(
            topic = event.topic(),
            booking_id = %event.booking_id(),
            "booking event emitted"
        );
        Ok(())
    }
}
