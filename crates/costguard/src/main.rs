//! CostGuard - Kubernetes cost analytics service
//!
//! Allocates the cloud bill to namespaces, compares periods, forecasts
//! spend and raises right-sizing recommendations on a schedule, and serves
//! the results over HTTP.

use anyhow::Result;
use costguard::{api, config::ServiceConfig};
use costguard_lib::{
    health::{components, HealthRegistry},
    scheduler::{JobKind, JobRunner, SchedulerLoop},
    store::MemoryStore,
    Pipeline, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting costguard");

    let config = ServiceConfig::load()?;
    info!(
        service = %config.service_name,
        port = config.api_port,
        clusters = ?config.schedule.clusters,
        "Service configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::SCHEDULER).await;
    for kind in JobKind::ALL {
        health_registry.register(kind.component()).await;
    }

    let store = Arc::new(MemoryStore::new());
    if let Some(seed) = &config.seed_file {
        if let Err(e) = store.load_seed(seed).await {
            error!(error = %format!("{:#}", e), "Failed to load seed data");
            health_registry
                .set_degraded(components::STORE, "Seed data could not be loaded")
                .await;
        }
    }

    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(SERVICE_VERSION, &config.schedule.clusters);

    let pipeline = Arc::new(
        Pipeline::new(store.clone(), store, config.analytics.clone()).with_logger(logger.clone()),
    );
    let runner = Arc::new(JobRunner::new(
        pipeline.clone(),
        config.schedule.clone(),
        health_registry.clone(),
    ));

    // Start the job scheduler
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = tokio::spawn(SchedulerLoop::new(runner.clone()).run(shutdown_rx));
    let scheduler_health = health_registry.clone();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.await {
            error!(error = %e, "Scheduler task failed");
            scheduler_health
                .set_unhealthy(components::SCHEDULER, format!("Scheduler task failed: {}", e))
                .await;
        }
    });

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), pipeline, runner));

    // Mark service as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and query server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    let _ = scheduler_handle.await;
    info!("Shutting down");

    Ok(())
}
