use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_booking::BookingError;
use serde_json::{json, Value};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    Booking(BookingError),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, Value) {
        tracing::error!("Internal Server Error: {}", detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Internal Server Error", "code": "INTERNAL" }),
        )
    }
}

fn body(code: &str, message: String) -> Value {
    json!({ "error": message, "code": code })
}

fn booking_response(err: BookingError) -> (StatusCode, Value) {
    let message = err.to_string();
    match err {
        BookingError::Validation(_) => (StatusCode::BAD_REQUEST, body("VALIDATION_ERROR", message)),
        BookingError::ServiceNotFound(_) => (StatusCode::NOT_FOUND, body("SERVICE_NOT_FOUND", message)),
        BookingError::BookingNotFound(_) => (StatusCode::NOT_FOUND, body("BOOKING_NOT_FOUND", message)),
        BookingError::AssessmentNotFound(_) => (StatusCode::NOT_FOUND, body("ASSESSMENT_NOT_FOUND", message)),
        BookingError::Conflict { conflicts } => (
            StatusCode::CONFLICT,
            json!({ "error": message, "code": "CONFLICT", "conflicts": conflicts }),
        ),
        BookingError::InvalidTransition { current, action, allowed } => (
            StatusCode::CONFLICT,
            json!({
                "error": message,
                "code": "INVALID_TRANSITION",
                "current_status": current,
                "action": action,
                "allowed_actions": allowed,
            }),
        ),
        BookingError::RiskBlocked(assessment_id) => (
            StatusCode::LOCKED,
            json!({ "error": message, "code": "RISK_BLOCKED", "assessment_id": assessment_id }),
        ),
        BookingError::ReviewPending(assessment_id) => (
            StatusCode::CONFLICT,
            json!({ "error": message, "code": "REVIEW_PENDING", "assessment_id": assessment_id }),
        ),
        BookingError::AlreadyResolved(_) => (StatusCode::CONFLICT, body("ALREADY_RESOLVED", message)),
        BookingError::AlreadyConfirmed(_) => (StatusCode::CONFLICT, body("ALREADY_CONFIRMED", message)),
        BookingError::VersionConflict(_) => (StatusCode::CONFLICT, body("VERSION_CONFLICT", message)),
        BookingError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, body("PAYMENT_REQUIRED", message)),
        BookingError::PaymentFailed(_) => {
            tracing::warn!("payment gateway failure: {}", message);
            (StatusCode::BAD_GATEWAY, body("PAYMENT_FAILED", message))
        }
        BookingError::Forbidden(_) => (StatusCode::FORBIDDEN, body("FORBIDDEN", message)),
        BookingError::Storage(detail) => AppError::internal(&detail),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, body("UNAUTHENTICATED", msg)),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, body("FORBIDDEN", msg)),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, body("VALIDATION_ERROR", msg)),
            AppError::Booking(err) => booking_response(err),
            AppError::Anyhow(err) => AppError::internal(&err),
        };

        (status, Json(payload)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_carries_allowed_actions() {
        let err = BookingError::InvalidTransition {
            current: "COMPLETED".to_string(),
            action: "CANCEL".to_string(),
            allowed: vec![],
        };
        let (status, payload) = booking_response(err);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(payload["code"], "INVALID_TRANSITION");
        assert_eq!(payload["current_status"], "COMPLETED");
        assert_eq!(payload["allowed_actions"], json!([]));
    }

    #[test]
    fn test_storage_detail_is_not_leaked() {
        let (status, payload) = booking_response(BookingError::Storage("connection refused".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload["error"], "Internal Server Error");
    }

    #[test]
    fn test_payment_statuses() {
        let (status, _) = booking_response(BookingError::PaymentRequired("declined".into()));
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let (status, _) = booking_response(BookingError::PaymentFailed("timeout".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
