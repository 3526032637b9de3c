//! Parking lifecycle reconciliation service.
//!
//! Consumes parking events from Redpanda, drives each session through the
//! SimplePark API and keeps the local `PostgreSQL` record in sync. Events that
//! cannot be reconciled end up in the `failed_parking_events` table.

mod config;

use crate::config::Config;
use anyhow::Context;
use parksync_core::environment::SystemClock;
use parksync_postgres::{DeadLetterQueue, PostgresSessionStore};
use parksync_redpanda::{DeliveryProcessor, ParkingEventConsumer};
use parksync_runtime::metrics::MetricsServer;
use parksync_runtime::retry::{RetryPolicy, retry_with_backoff};
use parksync_runtime::{EventRouter, ReconcilerEnvironment};
use parksync_simplepark::{SimpleParkClient, SimpleParkConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("Failed to read .env file");
        }
    }

    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        postgres_url = %config.postgres.url,
        redpanda_brokers = %config.redpanda.brokers,
        topic = %config.redpanda.topic,
        simplepark_url = %config.simplepark.base_url,
        "Starting parking reconciliation service"
    );

    let mut metrics = MetricsServer::new(config.server.metrics_addr);
    metrics.serve().context("Failed to start metrics server")?;

    // Postgres may still be starting when the service comes up
    info!("Connecting to database...");
    let connect_policy = RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_secs(1))
        .multiplier(2.0)
        .build();
    let store = retry_with_backoff(&connect_policy, || {
        PostgresSessionStore::connect(&config.postgres.url, config.postgres.max_connections)
    })
    .await
    .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;
    info!("Database connected and migrated");

    let dead_letters = DeadLetterQueue::new(store.pool().clone());

    let gateway = SimpleParkClient::new(
        SimpleParkConfig::new(&config.simplepark.base_url, &config.simplepark.api_key)
            .with_timeout(config.simplepark.timeout()),
    )
    .context("Failed to create SimplePark client")?;

    let clock = Arc::new(SystemClock);
    let router = EventRouter::new(ReconcilerEnvironment {
        gateway: Arc::new(gateway),
        store: Arc::new(store),
        clock: clock.clone(),
    });
    let redelivery = RetryPolicy::builder()
        .max_retries(config.delivery.max_retries)
        .initial_delay(config.delivery.backoff())
        .build();
    let processor = DeliveryProcessor::new(router, Arc::new(dead_letters), redelivery, clock);

    let consumer = ParkingEventConsumer::builder()
        .brokers(&config.redpanda.brokers)
        .consumer_group(&config.redpanda.consumer_group)
        .topic(&config.redpanda.topic)
        .auto_offset_reset(&config.redpanda.auto_offset_reset)
        .session_timeout(Duration::from_millis(config.redpanda.session_timeout_ms))
        .build()
        .context("Failed to create parking event consumer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let run = consumer.run(&processor, stop_requested(shutdown_rx.clone()));
    tokio::pin!(run);

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    tokio::select! {
        result = &mut run => result.context("Parking event consumer failed")?,
        () = async {
            stop_requested(shutdown_rx).await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                timeout_secs = grace.as_secs(),
                "Shutdown timeout elapsed, abandoning in-flight event (it will be redelivered)"
            );
        }
    }

    info!("Parking reconciliation service stopped");
    Ok(())
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    // A dropped sender means no signal can arrive any more; keep waiting.
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Graceful shutdown signal handler.
///
/// Waits for:
/// - Ctrl+C (SIGINT)
/// - SIGTERM (in production environments)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
