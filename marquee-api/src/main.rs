use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use marquee_api::{app, AppState, AuthConfig, BroadcastNotifier};
use marquee_booking::{
    AdmissionOrchestrator, BookingRepository, InMemoryBookingRepository, InMemoryRiskRepository,
    RiskAssessmentRepository,
};
use marquee_catalog::{InMemoryCalendar, IntervalStore};
use marquee_core::{LogNotifier, MockPaymentAdapter, Notifier};
use marquee_store::{
    load_catalog, Config, DbClient, EventProducer, KafkaNotifier, PgBookingRepository, PgIntervalStore,
    PgRiskRepository, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,marquee_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let catalog = Arc::new(load_catalog(&config.catalog.path).await?);

    // Persistence: Postgres when configured, otherwise in-process
    let (bookings, assessments, calendar): (
        Arc<dyn BookingRepository>,
        Arc<dyn RiskAssessmentRepository>,
        Arc<dyn IntervalStore>,
    ) = match &config.database {
        Some(db) => {
            let client = DbClient::new(&db.url, db.max_connections).await?;
            client.migrate().await?;
            (
                Arc::new(PgBookingRepository::new(client.pool.clone())) as Arc<dyn BookingRepository>,
                Arc::new(PgRiskRepository::new(client.pool.clone())) as Arc<dyn RiskAssessmentRepository>,
                Arc::new(PgIntervalStore::new(client.pool.clone())) as Arc<dyn IntervalStore>,
            )
        }
        None => {
            tracing::warn!("No database configured, bookings are kept in memory");
            (
                Arc::new(InMemoryBookingRepository::new()) as Arc<dyn BookingRepository>,
                Arc::new(InMemoryRiskRepository::new()) as Arc<dyn RiskAssessmentRepository>,
                Arc::new(InMemoryCalendar::new()) as Arc<dyn IntervalStore>,
            )
        }
    };

    let downstream: Arc<dyn Notifier> = match &config.kafka {
        Some(kafka) => Arc::new(KafkaNotifier::new(EventProducer::new(&kafka.brokers)?)),
        None => Arc::new(LogNotifier),
    };

    // SSE Broadcast Channel
    let (sse_tx, _) = tokio::sync::broadcast::channel(256);
    let notifier = Arc::new(BroadcastNotifier::new(downstream, sse_tx.clone()));

    let orchestrator = Arc::new(AdmissionOrchestrator::new(
        config.policy.clone(),
        bookings,
        assessments,
        calendar,
        catalog,
        Arc::new(MockPaymentAdapter),
        notifier,
    )?);

    let mut app_state = AppState::new(
        orchestrator.clone(),
        sse_tx,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    )?;

    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url).await?;
        app_state = app_state.with_redis(Arc::new(client), config.server.rate_limit_per_minute);
    }

    tokio::spawn(marquee_api::worker::start_lifecycle_worker(
        orchestrator,
        Duration::from_secs(config.server.scheduler_interval_seconds.max(1)),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
