use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events handed to the notification subsystem.
///
/// Statuses and levels travel as their wire strings so consumers do not
/// need the booking crate to decode them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    BookingConfirmed {
        booking_id: Uuid,
        celebrity_id: Uuid,
        confirmation_code: String,
        event_start: DateTime<Utc>,
        event_end: DateTime<Utc>,
        total_price: i64,
        currency: String,
        timestamp: i64,
    },
    BookingPendingReview {
        booking_id: Uuid,
        celebrity_id: Uuid,
        assessment_id: Uuid,
        risk_score: u32,
        risk_level: String,
        timestamp: i64,
    },
    RiskAlertRaised {
        booking_id: Uuid,
        celebrity_id: Uuid,
        assessment_id: Uuid,
        risk_score: u32,
        factors: Vec<String>,
        timestamp: i64,
    },
    BookingCancelled {
        booking_id: Uuid,
        celebrity_id: Uuid,
        cancelled_by: String,
        reason: String,
        refund_amount: i64,
        timestamp: i64,
    },
    BookingRejected {
        booking_id: Uuid,
        celebrity_id: Uuid,
        reason: String,
        timestamp: i64,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        celebrity_id: Uuid,
        from: String,
        to: String,
        timestamp: i64,
    },
}

impl BookingEvent {
    /// Topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::BookingConfirmed { .. } => "booking.confirmed",
            BookingEvent::BookingPendingReview { .. } => "booking.review",
            BookingEvent::RiskAlertRaised { .. } => "risk.alert",
            BookingEvent::BookingCancelled { .. } => "booking.cancelled",
            BookingEvent::BookingRejected { .. } => "booking.rejected",
            BookingEvent::BookingStatusChanged { .. } => "booking.status",
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingConfirmed { booking_id, .. }
            | BookingEvent::BookingPendingReview { booking_id, .. }
            | BookingEvent::RiskAlertRaised { booking_id, .. }
            | BookingEvent::BookingCancelled { booking_id, .. }
            | BookingEvent::BookingRejected { booking_id, .. }
            | BookingEvent::BookingStatusChanged { booking_id, .. } => *booking_id,
        }
    }

    pub fn celebrity_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingConfirmed { celebrity_id, .. }
            | BookingEvent::BookingPendingReview { celebrity_id, .. }
            | BookingEvent::RiskAlertRaised { celebrity_id, .. }
            | BookingEvent::BookingCancelled { celebrity_id, .. }
            | BookingEvent::BookingRejected { celebrity_id, .. }
            | BookingEvent::BookingStatusChanged { celebrity_id, .. } => *celebrity_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_on_the_wire() {
        let event = BookingEvent::BookingRejected {
            booking_id: Uuid::new_v4(),
            celebrity_id: Uuid::new_v4(),
            reason: "schedule".to_string(),
            timestamp: 0,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BOOKING_REJECTED");
        assert_eq!(event.topic(), "booking.rejected");
    }
}
