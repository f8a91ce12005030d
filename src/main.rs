mod api;
mod config;
mod error;
mod fetcher;
mod queue;
mod scorer;
mod store;
mod worker;

use anyhow::{Context, Result};
use api::{start_api_server, AppState};
use config::Config;
use fetcher::S3ImageFetcher;
use queue::SqsQueue;
use scorer::SidecarScorer;
use std::sync::Arc;
use store::FlightStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use worker::IngestWorker;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Skysweep ingestion service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let store = Arc::new(
        FlightStore::new(&config.database)
            .await
            .context("Failed to initialize flight store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let fetcher = Arc::new(
        S3ImageFetcher::new(&config.s3)
            .await
            .context("Failed to initialize image fetcher")?,
    );

    let scorer = Arc::new(SidecarScorer::new(config.scoring.clone()));

    let queue = Arc::new(
        SqsQueue::new(&config.queue)
            .await
            .context("Failed to initialize queue consumer")?,
    );

    // Wire the worker with explicitly injected dependencies
    let shutdown = CancellationToken::new();
    let ingest_worker = IngestWorker::new(
        queue,
        fetcher,
        scorer,
        store.clone(),
        &config.queue,
        shutdown.clone(),
    );

    // Spawn worker task
    let worker_handle = tokio::spawn(async move { ingest_worker.run().await });

    // Spawn API server task
    let api_state = AppState { store };
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Ingestion service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down; letting the in-flight cycle finish");

    // The worker exits between cycles so a received message is never
    // dropped mid-processing.
    shutdown.cancel();
    let _ = worker_handle.await;
    api_handle.abort();

    info!("Ingestion service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
