use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voyage_api::{app, state::{AppState, AuthConfig}, worker};
use voyage_core::notify::{LogNotificationSink, NotificationSink};
use voyage_core::{InventoryStore, SystemClock};
use voyage_store::app_config::{Config, NotificationSinkKind, StorageBackend};
use voyage_store::{DbClient, EventProducer, KafkaNotificationSink, MemoryStore, PgInventoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voyage_api=debug,voyage_booking=debug,voyage_waitlist=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Voyage API on port {}", config.server.port);

    let store: Arc<dyn InventoryStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
            db.migrate().await?;
            Arc::new(PgInventoryStore::new(db.pool.clone()))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; bookings are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let sink: Arc<dyn NotificationSink> = match config.notifications.sink {
        NotificationSinkKind::Kafka => {
            let producer = EventProducer::new(&config.kafka.brokers)?;
            Arc::new(KafkaNotificationSink::new(producer, config.kafka.topic.clone()))
        }
        NotificationSinkKind::Log => Arc::new(LogNotificationSink),
    };

    let rules = config.booking_rules.clone();
    let app_state = AppState::build(
        store,
        Arc::new(SystemClock),
        sink,
        &rules,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    );

    worker::spawn_background_workers(
        &app_state,
        Duration::from_secs(rules.expiry_sweep_seconds),
        Duration::from_secs(rules.reminder_sweep_seconds),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
