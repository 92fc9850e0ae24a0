//! Proxy Pool - Entry Point
//!
//! Connects to the backing store, runs migrations, and keeps the stored pool
//! fresh through the periodic re-validation service until shutdown.

use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod models;
mod repository;
mod services;
mod validator;

use config::Config;
use database::Database;
use repository::ProxyRepository;
use services::{RevalidateConfig, RevalidateHandle, RevalidateService};
use validator::{Validator, ValidatorConfig};

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proxy_pool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proxy Pool");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Connect to database
    let db = Database::new(&config).await?;
    let latency = db.health_check().await?;
    info!(latency_ms = latency.as_millis() as u64, "Database reachable");

    // Run migrations
    db.run_migrations().await?;

    let repo = ProxyRepository::new(db.pool().clone());
    info!("Pool currently holds {} proxies", repo.count().await?);

    // Build the validator from configuration
    let validator = Validator::new(ValidatorConfig {
        timeout: Duration::from_secs(config.validator.test_timeout),
        http_echo_url: config.validator.http_echo_url.clone(),
        https_echo_url: config.validator.https_echo_url.clone(),
        workers: config.validator.workers,
    });

    // Start the re-validation service
    let (revalidate_handle, revalidate_shutdown) = RevalidateHandle::new();
    let revalidate_service = RevalidateService::new(
        db.clone(),
        validator,
        RevalidateConfig {
            check_interval: Duration::from_secs(config.validator.revalidate_interval),
            max_score: config.pool.max_score,
        },
    );
    let revalidate_task = tokio::spawn(async move {
        revalidate_service.run(revalidate_shutdown).await;
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    revalidate_handle.shutdown();
    let _ = revalidate_task.await;

    db.close().await;
    info!("Proxy Pool stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
