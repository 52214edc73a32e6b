//! Prometheus counters for the admission flow and the `/metrics` endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

pub struct ApiMetrics {
    registry: Registry,
    pub bookings_created: IntCounter,
    /// Labelled by `outcome`: confirmed, pending_review, blocked, conflict, payment_required
    pub admissions: IntCounterVec,
    pub conflicts: IntCounter,
}

impl ApiMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let bookings_created = IntCounter::new("marquee_bookings_created_total", "Draft bookings created")?;
        let admissions = IntCounterVec::new(
            Opts::new("marquee_admissions_total", "Confirmation attempts by outcome"),
            &["outcome"],
        )?;
        let conflicts = IntCounter::new("marquee_conflicts_total", "Slot reservations refused by an overlap")?;

        registry.register(Box::new(bookings_created.clone()))?;
        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(conflicts.clone()))?;

        Ok(Self { registry, bookings_created, admissions, conflicts })
    }

    pub fn admission(&self, outcome: &str) {
        self.admissions.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("metrics encoding failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_admission_outcomes() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.bookings_created.inc();
        metrics.admission("confirmed");
        metrics.admission("confirmed");
        metrics.admission("pending_review");

        let body = metrics.render().unwrap();
        assert!(body.contains("marquee_bookings_created_total 1"));
        assert!(body.contains("marquee_admissions_total{outcome=\"confirmed\"} 2"));
        assert!(body.contains("marquee_admissions_total{outcome=\"pending_review\"} 1"));
        assert!(body.contains("marquee_conflicts_total 0"));
    }
}
