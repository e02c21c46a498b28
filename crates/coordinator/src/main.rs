use anyhow::Result;
use std::time::Duration;
use tracing::info;

use domain::services::JobRegistry;
use job_coordinator::config::Config;
use job_coordinator::jobs::register_builtin_jobs;
use job_coordinator::logging::init_logging;
use job_coordinator::JobCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting job coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Create database pool
    let pool = persistence::db::create_pool(&config.database.to_pool_config()).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let registry = JobRegistry::new();
    register_builtin_jobs(&registry, &config.results)?;

    let settings = config.coordinator_settings()?;
    info!(instance = %settings.instance_id, "Instance identity");

    let mut coordinator = JobCoordinator::new(pool.clone(), registry, settings)?;
    coordinator.start();

    shutdown_signal().await;

    coordinator
        .stop(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    pool.close().await;
    info!("Job coordinator stopped");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
