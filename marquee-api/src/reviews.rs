use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use marquee_booking::{ReviewDecision, ReviewOutcome};
use marquee_core::Actor;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/assessments/{id}/review", post(review_assessment))
}

/// POST /v1/assessments/{id}/review
/// An approval carries the booking through to confirmation; a slot lost in
/// the meantime is reported in `conflicts`.
async fn review_assessment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(assessment_id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewOutcome>, AppError> {
    let outcome = state
        .orchestrator
        .review_assessment(assessment_id, req.decision, &actor, req.notes)
        .await?;
    if !outcome.conflicts.is_empty() {
        state.metrics.conflicts.inc();
    }
    Ok(Json(outcome))
}
