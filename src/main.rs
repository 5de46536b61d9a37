use actix::prelude::*;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clinic_ledger::actors::OutboxRelayActor;
use clinic_ledger::api::{self, AppState};
use clinic_ledger::config::{AppConfig, StorageBackend};
use clinic_ledger::ledger::{LedgerExecutor, LedgerStore, MemoryLedgerStore, PgLedgerStore};
use clinic_ledger::messaging::{EventPublisher, KafkaEventPublisher, LoggingPublisher, OutboxRelay};
use clinic_ledger::metrics::Metrics;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, overridable with RUST_LOG
    // Example: RUST_LOG=clinic_ledger=trace cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clinic_ledger=debug"))
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    tracing::info!(
        storage = ?config.storage.backend,
        kafka = config.kafka.brokers.is_some(),
        "Starting clinic ledger"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Ledger store ===
    let store: Arc<dyn LedgerStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = PgLedgerStore::connect(&config.storage.database_url, config.storage.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            if config.storage.run_migrations {
                store.migrate().await.context("Failed to run migrations")?;
            }
            Arc::new(store)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory ledger store; data is lost on restart");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    // === 3. Event publisher (Kafka behind a circuit breaker, or the log) ===
    let publisher: Arc<dyn EventPublisher> = match &config.kafka.brokers {
        Some(brokers) => Arc::new(KafkaEventPublisher::new(
            brokers,
            config.send_timeout(),
            config.circuit_breaker_config(),
            metrics.clone(),
        )?),
        None => {
            tracing::warn!("No Kafka brokers configured, events will only be logged");
            Arc::new(LoggingPublisher)
        }
    };

    // === 4. Outbox relay ===
    let relay = Arc::new(OutboxRelay::new(
        store.clone(),
        publisher.clone(),
        metrics.clone(),
        config.relay_config(),
    ));
    let relay_actor = OutboxRelayActor::new(relay, config.relay_interval()).start();

    // === 5. HTTP API ===
    let executor = Arc::new(LedgerExecutor::new(store, publisher, metrics.clone()));
    let state = web::Data::new(AppState::new(executor, metrics).with_relay(relay_actor));

    let (host, port) = config.bind_address();
    tracing::info!("Listening on http://{}:{}", host, port);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind((host.as_str(), port))?
        .run()
        .await?;

    tracing::info!("Clinic ledger stopped");
    Ok(())
}
