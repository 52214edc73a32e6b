pub mod models;
pub mod risk;
pub mod cancellation;
pub mod lifecycle;
pub mod repository;
pub mod policy;
pub mod orchestrator;

pub use models::{Booking, BookingAction, BookingStatus, CancellationRecord, ClientContact, CreateBookingRequest, PaymentState};
pub use risk::{ReviewDecision, ReviewStatus, RiskAssessment, RiskLevel, RiskScoringEngine, RiskSignal, Severity, SignalCollector, SignalType};
pub use cancellation::{CancellationPolicy, CancellationWindows, RefundDecision};
pub use lifecycle::{BookingStateMachine, StatusChange};
pub use repository::{BookingRepository, InMemoryBookingRepository, InMemoryRiskRepository, RepositoryError, RiskAssessmentRepository};
pub use policy::AdmissionPolicy;
pub use orchestrator::{AdmissionOrchestrator, Availability, BookingQuote, BookingView, CancelOutcome, ConfirmOutcome, ReviewOutcome, ScheduleReport};

use marquee_catalog::{CalendarError, CatalogError, ConflictSummary, PricingError};
use uuid::Uuid;

/// Every failure an admission operation reports to its caller.
///
/// Errors are local to one booking; none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Risk assessment not found: {0}")]
    AssessmentNotFound(Uuid),

    #[error("Requested slot conflicts with {n} existing booking(s)", n = .conflicts.len())]
    Conflict { conflicts: Vec<ConflictSummary> },

    #[error("Cannot {action} from {current}; allowed: [{list}]", list = .allowed.join(", "))]
    InvalidTransition {
        current: String,
        action: String,
        allowed: Vec<String>,
    },

    #[error("Booking blocked by risk assessment {0} until a reviewer overrides it")]
    RiskBlocked(Uuid),

    #[error("Risk assessment {0} has not been approved yet")]
    ReviewPending(Uuid),

    #[error("Risk assessment already resolved as {0}")]
    AlreadyResolved(String),

    #[error("Booking already confirmed ({0})")]
    AlreadyConfirmed(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Payment gateway failure: {0}")]
    PaymentFailed(String),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Booking {0} was modified concurrently")]
    VersionConflict(Uuid),

    #[error("Storage failure: {0}")]
    Storage(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl From<RepositoryError> for BookingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => BookingError::BookingNotFound(id),
            RepositoryError::VersionConflict(id) => BookingError::VersionConflict(id),
            other => BookingError::Storage(other.to_string()),
        }
    }
}

impl From<CalendarError> for BookingError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::InvalidWindow(msg) => BookingError::Validation(msg),
            other => BookingError::Storage(other.to_string()),
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        BookingError::Storage(err.to_string())
    }
}

impl From<PricingError> for BookingError {
    fn from(err: PricingError) -> Self {
        BookingError::Validation(err.to_string())
    }
}
