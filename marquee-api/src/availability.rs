use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use marquee_booking::Availability;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub celebrity_id: Uuid,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/availability", get(check_availability))
}

/// GET /v1/availability?celebrity_id=..&start=..&duration_minutes=..
async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Availability>, AppError> {
    let availability = state
        .orchestrator
        .check_availability(query.celebrity_id, query.start, query.duration_minutes)
        .await?;
    Ok(Json(availability))
}
