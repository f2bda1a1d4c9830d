//! homedash - Home Server Dashboard
//!
//! Lists the services of a home lab, reports whether each is running and
//! starts or stops their compose projects in the background.

mod assets;
mod compose;
mod config;
mod dashboard;
mod db;
mod jobs;
mod monitor;
mod probe;
mod registry;
mod web;

#[cfg(test)]
mod testutil;

use compose::ComposeRunner;
use config::ServerConfig;
use dashboard::Dashboard;
use db::Store;
use jobs::{JobExecutor, RetentionManager};
use monitor::{MonitorCache, MonitorClient};
use probe::StatusResolver;
use registry::Registry;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("homedash=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting homedash on port {}...", cfg.http_port);
    tracing::info!("Using job database at {}", cfg.db_path);

    if let Some(root) = &cfg.service_root {
        match registry::init_service_root(root) {
            Ok(()) => tracing::info!("Service root: {}", root.display()),
            Err(e) => tracing::warn!("Failed to initialize service root {}: {}", root.display(), e),
        }
    }

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let runner = Arc::new(ComposeRunner::from_config(&cfg));
    if !runner.cli_available() {
        tracing::warn!(
            "Neither {} nor {} found; start/stop will be unavailable",
            cfg.docker_bin,
            cfg.legacy_compose_bin
        );
    }

    let monitor = MonitorClient::from_config(&cfg, Arc::new(MonitorCache::new()))?;
    if monitor.is_configured() {
        tracing::info!("Uptime Kuma metrics enabled");
    }

    let dashboard = Arc::new(Dashboard::new(
        Registry::from_config(&cfg),
        monitor,
        StatusResolver::new(runner.clone())?,
        JobExecutor::new(store.clone(), runner),
    ));

    let retention = RetentionManager::new(store, cfg.job_retention);
    retention.start();

    // Start web server
    let server = Server::new(cfg, dashboard);
    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;

    retention.stop().await;

    Ok(())
}
