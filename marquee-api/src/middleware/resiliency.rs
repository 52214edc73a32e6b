use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    /// Failing fast until the cool-down elapses
    Open,
    /// One trial request decides between Closed and Open
    HalfOpen,
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            opened_at: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a request may go through right now
    pub async fn check(&self) -> bool {
        match *self.state.read().await {
            CircuitState::Closed | CircuitState::HalfOpen => return true,
            CircuitState::Open => {}
        }

        let cooled_down = self
            .opened_at
            .read()
            .await
            .map(|at| at.elapsed() >= self.reset_timeout)
            .unwrap_or(true);
        if !cooled_down {
            return false;
        }

        let mut state = self.state.write().await;
        if *state == CircuitState::Open {
            *state = CircuitState::HalfOpen;
            tracing::info!(circuit = %self.name, "circuit half-open");
        }
        true
    }

    pub async fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!(circuit = %self.name, "circuit closed");
        }
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
            tracing::error!(circuit = %self.name, failures = count, "circuit opened");
        }
    }
}

/// Routes that move money through the payment gateway
fn is_payment_route(path: &str) -> bool {
    path.starts_with("/v1/bookings/")
        && ["/confirm", "/cancel", "/emergency-cancel", "/balance"]
            .iter()
            .any(|suffix| path.ends_with(suffix))
}

pub async fn circuit_breaker_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_payment_route(req.uri().path()) {
        return next.run(req).await;
    }

    let cb = &state.resiliency.payment_cb;
    if !cb.check().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": format!("Circuit breaker [{}] is open", cb.name),
                "code": "SERVICE_UNAVAILABLE",
            })),
        )
            .into_response();
    }

    let response = next.run(req).await;
    if response.status().is_server_error() {
        cb.record_failure().await;
    } else {
        cb.record_success().await;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new("payment", 2, Duration::from_secs(60));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.check().await);
    }

    #[tokio::test]
    async fn test_half_open_trial_recovers() {
        let cb = CircuitBreaker::new("payment", 1, Duration::from_millis(0));
        cb.record_failure().await;
        assert!(cb.check().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("payment", 3, Duration::from_millis(0));
        for _ in 0..3 {
            cb.record_failure().await;
        }
        assert!(cb.check().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[test]
    fn test_payment_routes() {
        assert!(is_payment_route("/v1/bookings/9b1c/confirm"));
        assert!(is_payment_route("/v1/bookings/9b1c/emergency-cancel"));
        assert!(!is_payment_route("/v1/bookings/9b1c/approve"));
        assert!(!is_payment_route("/v1/availability"));
    }
}
