//! Booking lifecycle.
//!
//! Every status change goes through [`BookingStateMachine`]. The transition
//! table is a closed match over `(status, action)`; adding a status or an
//! action fails to compile until the table covers it.

use chrono::{DateTime, Utc};
use marquee_catalog::Reservation;
use marquee_core::Actor;
use serde::{Deserialize, Serialize};

use crate::cancellation::{CancellationPolicy, RefundDecision};
use crate::models::{Booking, BookingAction, BookingStatus, CancellationRecord};
use crate::risk::{ReviewStatus, RiskAssessment, RiskScoringEngine, RiskSignal};
use crate::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub at: DateTime<Utc>,
}

/// Target status for `action` taken from `status`, if the edge exists
pub fn next_status(status: BookingStatus, action: BookingAction) -> Option<BookingStatus> {
    use BookingAction as A;
    use BookingStatus as S;

    match status {
        S::Draft => match action {
            A::Submit => Some(S::Pending),
            A::Cancel => Some(S::Cancelled),
            A::Confirm | A::Decline | A::Start | A::Complete | A::EmergencyCancel => None,
        },
        S::Pending => match action {
            A::Confirm => Some(S::Confirmed),
            A::Decline => Some(S::Rejected),
            A::Cancel => Some(S::Cancelled),
            A::Submit | A::Start | A::Complete | A::EmergencyCancel => None,
        },
        S::Confirmed => match action {
            A::Start => Some(S::InProgress),
            A::Cancel => Some(S::Cancelled),
            A::Submit | A::Confirm | A::Decline | A::Complete | A::EmergencyCancel => None,
        },
        S::InProgress => match action {
            A::Complete => Some(S::Completed),
            A::EmergencyCancel => Some(S::Cancelled),
            A::Submit | A::Confirm | A::Decline | A::Cancel | A::Start => None,
        },
        S::Completed | S::Cancelled | S::Rejected => None,
    }
}

pub fn allowed_actions(status: BookingStatus) -> Vec<BookingAction> {
    BookingAction::ALL
        .into_iter()
        .filter(|action| next_status(status, *action).is_some())
        .collect()
}

/// Applies lifecycle transitions and their guards to a booking in memory.
///
/// Persisting the result is the caller's job. A failed guard leaves the
/// booking untouched.
#[derive(Debug, Clone, Default)]
pub struct BookingStateMachine {
    risk: RiskScoringEngine,
    cancellation: CancellationPolicy,
}

impl BookingStateMachine {
    pub fn new(risk: RiskScoringEngine, cancellation: CancellationPolicy) -> Self {
        Self { risk, cancellation }
    }

    pub fn cancellation_policy(&self) -> &CancellationPolicy {
        &self.cancellation
    }

    fn transition(&self, booking: &mut Booking, action: BookingAction, now: DateTime<Utc>) -> BookingResult<StatusChange> {
        let from = booking.status;
        let to = next_status(from, action).ok_or_else(|| BookingError::InvalidTransition {
            current: from.as_str().to_string(),
            action: action.as_str().to_string(),
            allowed: allowed_actions(from).iter().map(|a| a.as_str().to_string()).collect(),
        })?;

        booking.status = to;
        booking.updated_at = now;
        tracing::debug!(booking_id = %booking.id, %from, %to, %action, "booking transition");
        Ok(StatusChange { from, to, at: now })
    }

    /// Fails with `InvalidTransition` unless `action` is legal from the current status
    pub fn ensure(&self, booking: &Booking, action: BookingAction) -> BookingResult<()> {
        if next_status(booking.status, action).is_some() {
            return Ok(());
        }
        Err(BookingError::InvalidTransition {
            current: booking.status.as_str().to_string(),
            action: action.as_str().to_string(),
            allowed: allowed_actions(booking.status).iter().map(|a| a.as_str().to_string()).collect(),
        })
    }

    /// draft → pending. Scores the request and links the new assessment.
    pub fn submit(
        &self,
        booking: &mut Booking,
        signals: &[RiskSignal],
        now: DateTime<Utc>,
    ) -> BookingResult<(StatusChange, RiskAssessment)> {
        self.ensure(booking, BookingAction::Submit)?;
        if !booking.terms_accepted {
            return Err(BookingError::Validation("terms must be accepted before submission".to_string()));
        }
        if !booking.payment_state.is_collected() {
            return Err(BookingError::PaymentRequired(format!(
                "deposit not collected for {}",
                booking.confirmation_code
            )));
        }

        let assessment = self.risk.assess(booking, signals, now);
        let change = self.transition(booking, BookingAction::Submit, now)?;
        booking.risk_assessment_id = Some(assessment.id);
        Ok((change, assessment))
    }

    /// pending → confirmed. Requires the slot to be held and risk to be cleared.
    pub fn confirm(
        &self,
        booking: &mut Booking,
        assessment: Option<&RiskAssessment>,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::Confirm)?;

        if reservation.booking_id != booking.id
            || reservation.celebrity_id != booking.celebrity_id
            || reservation.window != booking.window()?
        {
            return Err(BookingError::Validation(format!(
                "reservation does not cover booking {}",
                booking.confirmation_code
            )));
        }
        if !booking.payment_state.is_collected() {
            return Err(BookingError::PaymentRequired(format!(
                "deposit not collected for {}",
                booking.confirmation_code
            )));
        }

        let assessment = match assessment {
            Some(a) if Some(a.id) == booking.risk_assessment_id && a.is_current() => a,
            _ => {
                return Err(BookingError::Validation(format!(
                    "booking {} has no current risk assessment",
                    booking.confirmation_code
                )))
            }
        };
        match assessment.review_status {
            ReviewStatus::Approved => {}
            ReviewStatus::Pending | ReviewStatus::UnderReview | ReviewStatus::Escalated | ReviewStatus::Rejected => {
                return Err(if assessment.auto_block {
                    BookingError::RiskBlocked(assessment.id)
                } else {
                    BookingError::ReviewPending(assessment.id)
                });
            }
        }

        self.transition(booking, BookingAction::Confirm, now)
    }

    /// pending → rejected
    pub fn decline(&self, booking: &mut Booking, reason: &str, now: DateTime<Utc>) -> BookingResult<StatusChange> {
        let change = self.transition(booking, BookingAction::Decline, now)?;
        booking.rejection_reason = Some(reason.to_string());
        Ok(change)
    }

    /// Client or manager cancellation, refund per the policy windows
    pub fn cancel(
        &self,
        booking: &mut Booking,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::Cancel)?;
        let refund = self
            .cancellation
            .evaluate(booking.event_start, now, booking.pricing.total_price);
        self.record_cancellation(booking, BookingAction::Cancel, actor, reason, refund, now)
    }

    /// System cancellation after a failed downstream step. Everything paid is returned.
    pub fn compensate(&self, booking: &mut Booking, reason: &str, now: DateTime<Utc>) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::Cancel)?;
        let refund = self.cancellation.full_refund(booking.amount_paid, now);
        self.record_cancellation(booking, BookingAction::Cancel, &Actor::system(), reason, refund, now)
    }

    /// in_progress → cancelled
    pub fn emergency_cancel(
        &self,
        booking: &mut Booking,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::EmergencyCancel)?;
        let refund = self
            .cancellation
            .evaluate(booking.event_start, now, booking.pricing.total_price);
        self.record_cancellation(booking, BookingAction::EmergencyCancel, actor, reason, refund, now)
    }

    fn record_cancellation(
        &self,
        booking: &mut Booking,
        action: BookingAction,
        actor: &Actor,
        reason: &str,
        refund: RefundDecision,
        now: DateTime<Utc>,
    ) -> BookingResult<StatusChange> {
        let refund_due = refund.amount.min(booking.amount_paid);
        let change = self.transition(booking, action, now)?;
        booking.cancellation = Some(CancellationRecord {
            reason: reason.to_string(),
            cancelled_at: now,
            cancelled_by: actor.id.clone(),
            refund,
            refund_due,
        });
        Ok(change)
    }

    /// confirmed → in_progress once the event has started
    pub fn start(&self, booking: &mut Booking, now: DateTime<Utc>) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::Start)?;
        if now < booking.event_start {
            return Err(BookingError::Validation(format!(
                "event for {} has not started",
                booking.confirmation_code
            )));
        }
        self.transition(booking, BookingAction::Start, now)
    }

    /// in_progress → completed once the event has ended
    pub fn complete(&self, booking: &mut Booking, now: DateTime<Utc>) -> BookingResult<StatusChange> {
        self.ensure(booking, BookingAction::Complete)?;
        if now < booking.event_end() {
            return Err(BookingError::Validation(format!(
                "event for {} has not ended",
                booking.confirmation_code
            )));
        }
        self.transition(booking, BookingAction::Complete, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientContact, CreateBookingRequest, PaymentState};
    use crate::risk::{Severity, SignalType};
    use chrono::Duration;
    use marquee_catalog::{PricingBreakdown, QuoteSelection, SecurityTier, TravelTier};
    use marquee_core::Role;
    use marquee_shared::Masked;
    use uuid::Uuid;

    const ALL_STATUSES: [BookingStatus; 7] = [
        BookingStatus::Draft,
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    fn booking(now: DateTime<Utc>) -> Booking {
        let request = CreateBookingRequest {
            celebrity_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            event_start: now + Duration::days(45),
            event_duration_minutes: Some(90),
            client: ClientContact {
                name: "Riley Park".to_string(),
                email: Masked::new("riley@venue.example".to_string()),
                phone: None,
            },
            selection: QuoteSelection {
                add_on_ids: vec![],
                travel_tier: TravelTier::Regional,
                security_tier: SecurityTier::Enhanced,
            },
            stated_budget: None,
            terms_accepted: true,
        };
        let pricing = PricingBreakdown::from_components(2_500_000, 100_000, 300_000, 200_000, 150_000, 5_000, "USD").unwrap();
        Booking::draft("client-9".to_string(), request, 90, pricing, now)
    }

    fn reservation_for(b: &Booking, now: DateTime<Utc>) -> Reservation {
        Reservation {
            celebrity_id: b.celebrity_id,
            booking_id: b.id,
            window: b.window().unwrap(),
            reserved_at: now,
        }
    }

    fn heavy_signal() -> RiskSignal {
        RiskSignal {
            signal_type: SignalType::BudgetAboveRange,
            severity: Severity::High,
            weight: 80,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_undefined_edges_are_rejected_without_change() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();

        for status in ALL_STATUSES {
            for action in BookingAction::ALL {
                if next_status(status, action).is_some() {
                    continue;
                }
                let mut b = booking(now);
                b.status = status;
                let before = b.updated_at;

                let result = match action {
                    BookingAction::Submit => machine.submit(&mut b, &[], now).map(|(c, _)| c),
                    BookingAction::Confirm => {
                        let r = reservation_for(&b, now);
                        machine.confirm(&mut b, None, &r, now)
                    }
                    BookingAction::Decline => machine.decline(&mut b, "no", now),
                    BookingAction::Cancel => machine.cancel(&mut b, &Actor::system(), "no", now),
                    BookingAction::Start => machine.start(&mut b, now),
                    BookingAction::Complete => machine.complete(&mut b, now),
                    BookingAction::EmergencyCancel => machine.emergency_cancel(&mut b, &Actor::system(), "no", now),
                };

                match result {
                    Err(BookingError::InvalidTransition { current, allowed, .. }) => {
                        assert_eq!(current, status.as_str());
                        assert_eq!(allowed.len(), allowed_actions(status).len());
                    }
                    other => panic!("{:?} + {:?} should be invalid, got {:?}", status, action, other),
                }
                assert_eq!(b.status, status);
                assert_eq!(b.updated_at, before);
            }
        }
    }

    #[test]
    fn test_terminal_statuses_allow_nothing() {
        for status in [BookingStatus::Completed, BookingStatus::Cancelled, BookingStatus::Rejected] {
            assert!(allowed_actions(status).is_empty());
        }
    }

    #[test]
    fn test_submit_requires_collected_deposit() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();
        let mut b = booking(now);

        let err = machine.submit(&mut b, &[], now).unwrap_err();
        assert!(matches!(err, BookingError::PaymentRequired(_)));
        assert_eq!(b.status, BookingStatus::Draft);

        b.record_deposit("pay_1".to_string(), b.pricing.deposit, now);
        let (change, assessment) = machine.submit(&mut b, &[], now).unwrap();
        assert_eq!(change.to, BookingStatus::Pending);
        assert_eq!(b.risk_assessment_id, Some(assessment.id));
    }

    #[test]
    fn test_confirm_blocked_until_high_risk_is_approved() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();
        let mut b = booking(now);
        b.record_deposit("pay_1".to_string(), b.pricing.deposit, now);
        let (_, mut assessment) = machine.submit(&mut b, &[heavy_signal()], now).unwrap();
        let reservation = reservation_for(&b, now);

        let err = machine.confirm(&mut b, Some(&assessment), &reservation, now).unwrap_err();
        assert!(matches!(err, BookingError::RiskBlocked(id) if id == assessment.id));
        assert_eq!(b.status, BookingStatus::Pending);

        assessment.review_status = ReviewStatus::Approved;
        let change = machine.confirm(&mut b, Some(&assessment), &reservation, now).unwrap();
        assert_eq!(change.to, BookingStatus::Confirmed);
        assert!(b.payment_state.is_collected());
    }

    #[test]
    fn test_confirm_rejects_foreign_reservation() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();
        let mut b = booking(now);
        b.record_deposit("pay_1".to_string(), b.pricing.deposit, now);
        let (_, assessment) = machine.submit(&mut b, &[], now).unwrap();

        let mut reservation = reservation_for(&b, now);
        reservation.booking_id = Uuid::new_v4();
        assert!(machine.confirm(&mut b, Some(&assessment), &reservation, now).is_err());
    }

    #[test]
    fn test_cancel_caps_refund_at_amount_paid() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();
        let mut b = booking(now);
        b.record_deposit("pay_1".to_string(), b.pricing.deposit, now);
        b.status = BookingStatus::Confirmed;

        let actor = Actor::new("client-9", Role::Client);
        machine.cancel(&mut b, &actor, "schedule change", now).unwrap();

        let record = b.cancellation.as_ref().unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(record.refund.amount, 3_250_000);
        assert_eq!(record.refund_due, 1_625_000);
        assert_eq!(record.cancelled_by, "client-9");
    }

    #[test]
    fn test_scheduled_transitions_respect_event_time() {
        let machine = BookingStateMachine::default();
        let now = Utc::now();
        let mut b = booking(now);
        b.status = BookingStatus::Confirmed;
        b.payment_state = PaymentState::DepositPaid;

        let start = b.event_start;
        let end = b.event_end();

        assert!(machine.start(&mut b, now).is_err());
        machine.start(&mut b, start).unwrap();
        assert_eq!(b.status, BookingStatus::InProgress);

        assert!(machine.complete(&mut b, start + Duration::minutes(30)).is_err());
        machine.complete(&mut b, end).unwrap();
        assert_eq!(b.status, BookingStatus::Completed);
    }
}
