use std::sync::Arc;
use std::time::Duration;
use marquee_booking::AdmissionOrchestrator;
use marquee_shared::BookingEvent;
use marquee_store::RedisClient;
use tokio::sync::broadcast;

use crate::metrics::ApiMetrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

pub struct ResiliencyState {
    pub payment_cb: CircuitBreaker,
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self {
            payment_cb: CircuitBreaker::new("payment", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AdmissionOrchestrator>,
    /// Absent: rate limiting is off
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit_per_minute: i64,
    pub sse_tx: broadcast::Sender<BookingEvent>,
    pub auth: AuthConfig,
    pub metrics: Arc<ApiMetrics>,
    pub resiliency: Arc<ResiliencyState>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<AdmissionOrchestrator>,
        sse_tx: broadcast::Sender<BookingEvent>,
        auth: AuthConfig,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            orchestrator,
            redis: None,
            rate_limit_per_minute: 100,
            sse_tx,
            auth,
            metrics: Arc::new(ApiMetrics::new()?),
            resiliency: Arc::new(ResiliencyState::default()),
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>, limit_per_minute: i64) -> Self {
        self.redis = Some(redis);
        self.rate_limit_per_minute = limit_per_minute;
        self
    }
}
