pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod risk_repo;
pub mod interval_repo;
pub mod catalog_repo;
pub mod redis_repo;
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use booking_repo::PgBookingRepository;
pub use risk_repo::PgRiskRepository;
pub use interval_repo::PgIntervalStore;
pub use catalog_repo::load_catalog;
pub use redis_repo::RedisClient;
pub use events::{EventProducer, KafkaNotifier};

/// Start-up failures of the infrastructure layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] marquee_catalog::CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
