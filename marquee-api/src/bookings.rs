use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use marquee_booking::{
    Booking, BookingError, BookingQuote, BookingStatus, BookingView, CancelOutcome, ConfirmOutcome,
    CreateBookingRequest, RiskLevel, RiskSignal,
};
use marquee_core::Actor;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub payment_method_ref: String,
    /// Signals raised upstream (identity verification, fraud feeds)
    #[serde(default)]
    pub signals: Vec<RiskSignal>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub payment_method_ref: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/code/{code}", get(get_booking_by_code))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/approve", post(approve_booking))
        .route("/v1/bookings/{id}/decline", post(decline_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/emergency-cancel", post(emergency_cancel))
        .route("/v1/bookings/{id}/balance", post(record_balance))
}

/// Admission outcome label for `marquee_admissions_total`
fn record_admission(state: &AppState, result: &Result<ConfirmOutcome, BookingError>) {
    let outcome = match result {
        Ok(o) if o.status == BookingStatus::Confirmed => "confirmed",
        Ok(o) if o.risk_level == RiskLevel::High => "blocked",
        Ok(_) => "pending_review",
        Err(BookingError::Conflict { .. }) => {
            state.metrics.conflicts.inc();
            "conflict"
        }
        Err(BookingError::RiskBlocked(_)) => "blocked",
        Err(BookingError::PaymentRequired(_)) | Err(BookingError::PaymentFailed(_)) => "payment_required",
        Err(_) => "error",
    };
    state.metrics.admission(outcome);
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingQuote>), AppError> {
    let quote = state.orchestrator.create_booking(&actor, req).await?;
    state.metrics.bookings_created.inc();
    Ok((StatusCode::CREATED, Json(quote)))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    Ok(Json(state.orchestrator.get_booking(booking_id, &actor).await?))
}

/// GET /v1/bookings/code/{code}
async fn get_booking_by_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(code): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let code = code.trim().to_ascii_uppercase();
    Ok(Json(state.orchestrator.get_booking_by_code(&code, &actor).await?))
}

/// POST /v1/bookings/{id}/confirm
/// Collects the deposit, scores the booking and confirms it or routes it to review
async fn confirm_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmOutcome>, AppError> {
    let result = state
        .orchestrator
        .confirm_booking(booking_id, &actor, &req.payment_method_ref, req.signals)
        .await;
    record_admission(&state, &result);
    Ok(Json(result?))
}

/// POST /v1/bookings/{id}/approve
async fn approve_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<ConfirmOutcome>, AppError> {
    let result = state.orchestrator.approve_booking(booking_id, &actor).await;
    record_admission(&state, &result);
    Ok(Json(result?))
}

/// POST /v1/bookings/{id}/decline
async fn decline_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.orchestrator.decline_booking(booking_id, &actor, &req.reason).await?))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.orchestrator.cancel_booking(booking_id, &actor, &req.reason).await?))
}

/// POST /v1/bookings/{id}/emergency-cancel
async fn emergency_cancel(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.orchestrator.emergency_cancel(booking_id, &actor, &req.reason).await?))
}

/// POST /v1/bookings/{id}/balance
async fn record_balance(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<BalanceRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(
        state
            .orchestrator
            .record_balance_payment(booking_id, &actor, &req.payment_method_ref)
            .await?,
    ))
}
