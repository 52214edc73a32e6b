pub mod clock;
pub mod identity;
pub mod notify;
pub mod payment;

pub use clock::{Clock, FixedClock, SystemClock};
pub use identity::{Actor, Role};
pub use notify::{LogNotifier, Notifier};
pub use payment::{MockPaymentAdapter, PaymentAdapter, PaymentReceipt, PaymentStatus};

/// Failures reported by external collaborators (payment gateway, notifier, identity).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Gateway unavailable: {0}")]
    GatewayError(String),
    #[error("Notification delivery failed: {0}")]
    NotificationError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
