use chrono::{DateTime, Duration, Utc};
use marquee_catalog::{PricingBreakdown, QuoteSelection, TimeWindow};
use marquee_catalog::calendar::MAX_DURATION_MINUTES;
use marquee_shared::Masked;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::cancellation::RefundDecision;
use crate::BookingError;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Draft,
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "DRAFT",
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(BookingStatus::Draft),
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "IN_PROGRESS" => Ok(BookingStatus::InProgress),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "REJECTED" => Ok(BookingStatus::Rejected),
            other => Err(BookingError::Storage(format!("unknown booking status {}", other))),
        }
    }
}

/// Events that drive the booking lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingAction {
    Submit,
    Confirm,
    Decline,
    Cancel,
    Start,
    Complete,
    EmergencyCancel,
}

impl BookingAction {
    pub const ALL: [BookingAction; 7] = [
        BookingAction::Submit,
        BookingAction::Confirm,
        BookingAction::Decline,
        BookingAction::Cancel,
        BookingAction::Start,
        BookingAction::Complete,
        BookingAction::EmergencyCancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Submit => "submit",
            BookingAction::Confirm => "confirm",
            BookingAction::Decline => "decline",
            BookingAction::Cancel => "cancel",
            BookingAction::Start => "start",
            BookingAction::Complete => "complete",
            BookingAction::EmergencyCancel => "emergency_cancel",
        }
    }
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment progress, tracked independently of the booking status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    DepositPaid,
    PaidInFull,
    Refunded,
    Failed,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::DepositPaid => "DEPOSIT_PAID",
            PaymentState::PaidInFull => "PAID_IN_FULL",
            PaymentState::Refunded => "REFUNDED",
            PaymentState::Failed => "FAILED",
        }
    }

    pub fn is_collected(&self) -> bool {
        matches!(self, PaymentState::DepositPaid | PaymentState::PaidInFull)
    }
}

impl FromStr for PaymentState {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentState::Pending),
            "DEPOSIT_PAID" => Ok(PaymentState::DepositPaid),
            "PAID_IN_FULL" => Ok(PaymentState::PaidInFull),
            "REFUNDED" => Ok(PaymentState::Refunded),
            "FAILED" => Ok(PaymentState::Failed),
            other => Err(BookingError::Storage(format!("unknown payment state {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContact {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
}

/// Record of how and why a booking left the calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: String,
    /// Policy outcome computed on the total price
    pub refund: RefundDecision,
    /// What is actually returned: the policy amount capped at what was paid
    pub refund_due: i64,
}

/// Client input for a new booking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub celebrity_id: Uuid,
    pub service_id: Uuid,
    pub event_start: DateTime<Utc>,
    /// Falls back to the catalog default
    #[serde(default)]
    pub event_duration_minutes: Option<u32>,
    pub client: ClientContact,
    pub selection: QuoteSelection,
    #[serde(default)]
    pub stated_budget: Option<i64>,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl CreateBookingRequest {
    /// Shape checks that need no catalog lookup
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.client.name.trim().is_empty() {
            return Err(BookingError::Validation("client name is required".to_string()));
        }
        let email = self.client.email.expose();
        let valid_email = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid_email {
            return Err(BookingError::Validation("client email is malformed".to_string()));
        }
        if let Some(phone) = &self.client.phone {
            let digits = phone.expose().chars().filter(|c| c.is_ascii_digit()).count();
            if digits < 7 {
                return Err(BookingError::Validation("client phone is malformed".to_string()));
            }
        }
        if self.event_start <= now {
            return Err(BookingError::Validation("event must start in the future".to_string()));
        }
        if let Some(minutes) = self.event_duration_minutes {
            if minutes == 0 || minutes > MAX_DURATION_MINUTES {
                return Err(BookingError::Validation(format!(
                    "event duration must be between 1 and {} minutes",
                    MAX_DURATION_MINUTES
                )));
            }
        }
        if matches!(self.stated_budget, Some(budget) if budget < 0) {
            return Err(BookingError::Validation("stated budget cannot be negative".to_string()));
        }
        Ok(())
    }
}

/// A celebrity booking. Never hard-deleted; cancellation is a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub confirmation_code: String,
    pub celebrity_id: Uuid,
    pub service_id: Uuid,
    pub client_id: String,
    pub event_start: DateTime<Utc>,
    pub event_duration_minutes: u32,
    pub status: BookingStatus,
    pub client: ClientContact,
    pub selection: QuoteSelection,
    pub pricing: PricingBreakdown,
    pub payment_state: PaymentState,
    pub payment_reference: Option<String>,
    pub amount_paid: i64,
    pub terms_accepted: bool,
    pub stated_budget: Option<i64>,
    pub risk_assessment_id: Option<Uuid>,
    pub cancellation: Option<CancellationRecord>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every persisted change; used for compare-and-swap updates
    pub version: u64,
}

impl Booking {
    pub fn draft(
        client_id: String,
        request: CreateBookingRequest,
        duration_minutes: u32,
        pricing: PricingBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            confirmation_code: generate_confirmation_code(),
            celebrity_id: request.celebrity_id,
            service_id: request.service_id,
            client_id,
            event_start: request.event_start,
            event_duration_minutes: duration_minutes,
            status: BookingStatus::Draft,
            client: request.client,
            selection: request.selection,
            pricing,
            payment_state: PaymentState::Pending,
            payment_reference: None,
            amount_paid: 0,
            terms_accepted: request.terms_accepted,
            stated_budget: request.stated_budget,
            risk_assessment_id: None,
            cancellation: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn event_end(&self) -> DateTime<Utc> {
        self.event_start + Duration::minutes(self.event_duration_minutes as i64)
    }

    pub fn window(&self) -> Result<TimeWindow, BookingError> {
        Ok(TimeWindow::from_duration(self.event_start, self.event_duration_minutes)?)
    }

    pub fn record_deposit(&mut self, reference: String, amount: i64, now: DateTime<Utc>) {
        self.payment_state = PaymentState::DepositPaid;
        self.payment_reference = Some(reference);
        self.amount_paid += amount;
        self.updated_at = now;
    }

    pub fn record_balance(&mut self, reference: String, amount: i64, now: DateTime<Utc>) {
        self.payment_state = PaymentState::PaidInFull;
        self.payment_reference = Some(reference);
        self.amount_paid += amount;
        self.updated_at = now;
    }

    pub fn record_payment_failure(&mut self, now: DateTime<Utc>) {
        self.payment_state = PaymentState::Failed;
        self.updated_at = now;
    }

    pub fn record_refund(&mut self, amount: i64, now: DateTime<Utc>) {
        self.amount_paid -= amount.min(self.amount_paid);
        if self.amount_paid == 0 {
            self.payment_state = PaymentState::Refunded;
        }
        self.updated_at = now;
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.client_id == actor_id
    }
}

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;

/// Human-readable confirmation code, e.g. `MRQ-7KQ2M9XH`
pub fn generate_confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("MRQ-{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_catalog::{SecurityTier, TravelTier};

    fn request(now: DateTime<Utc>) -> CreateBookingRequest {
        CreateBookingRequest {
            celebrity_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            event_start: now + Duration::days(60),
            event_duration_minutes: Some(30),
            client: ClientContact {
                name: "Jordan Lee".to_string(),
                email: Masked::new("jordan@events.example".to_string()),
                phone: Some(Masked::new("+1 555 010 2000".to_string())),
            },
            selection: QuoteSelection {
                add_on_ids: vec![],
                travel_tier: TravelTier::Local,
                security_tier: SecurityTier::Standard,
            },
            stated_budget: Some(1_000_000),
            terms_accepted: true,
        }
    }

    #[test]
    fn test_confirmation_code_format() {
        let code = generate_confirmation_code();
        assert!(code.starts_with("MRQ-"));
        assert_eq!(code.len(), 4 + CODE_LENGTH);
        assert!(code[4..].bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_request_validation() {
        let now = Utc::now();
        assert!(request(now).validate(now).is_ok());

        let mut bad_email = request(now);
        bad_email.client.email = Masked::new("jordan".to_string());
        assert!(matches!(bad_email.validate(now), Err(BookingError::Validation(_))));

        let mut past = request(now);
        past.event_start = now - Duration::hours(1);
        assert!(past.validate(now).is_err());

        let mut zero = request(now);
        zero.event_duration_minutes = Some(0);
        assert!(zero.validate(now).is_err());

        let mut negative = request(now);
        negative.stated_budget = Some(-5);
        assert!(negative.validate(now).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Draft,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::InProgress,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("ARCHIVED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_refund_never_exceeds_paid() {
        let now = Utc::now();
        let pricing = marquee_catalog::PricingBreakdown::from_components(1000, 0, 0, 0, 0, 5_000, "USD").unwrap();
        let mut booking = Booking::draft("client-1".to_string(), request(now), 30, pricing, now);

        booking.record_deposit("pay_1".to_string(), 500, now);
        booking.record_refund(800, now);
        assert_eq!(booking.amount_paid, 0);
        assert_eq!(booking.payment_state, PaymentState::Refunded);
    }

    #[test]
    fn test_partial_refund_keeps_payment_state() {
        let now = Utc::now();
        let pricing = marquee_catalog::PricingBreakdown::from_components(1000, 0, 0, 0, 0, 5_000, "USD").unwrap();
        let mut booking = Booking::draft("client-1".to_string(), request(now), 30, pricing, now);

        booking.record_deposit("pay_1".to_string(), 500, now);
        booking.record_balance("pay_2".to_string(), 500, now);
        booking.record_refund(500, now);
        assert_eq!(booking.amount_paid, 500);
        assert_eq!(booking.payment_state, PaymentState::PaidInFull);
    }
}
