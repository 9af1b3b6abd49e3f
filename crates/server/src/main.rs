mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use gemba_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use gemba_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

    // RUST_LOG overrides the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let state = routes::AppState {
        orchestrator: app.orchestrator.clone(),
        tickets: app.tickets.clone(),
        links: app.links.clone(),
    };
    let router = routes::router(state).merge(health::router(app.db_pool.clone()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "server.started",
        bind_address = %address,
        "gemba-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    // Let queued notification and sync tasks finish before exiting.
    tracing::info!(event_name = "server.stopping", "draining background tasks");
    app.orchestrator
        .queue()
        .drain(Duration::from_secs(app.config.server.graceful_shutdown_secs))
        .await;
    app.db_pool.close().await;
    tracing::info!(event_name = "server.stopped", "gemba-server shut down");

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "server.signal_error",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
