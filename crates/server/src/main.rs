mod bootstrap;
mod health;
pub mod routes;

use std::time::Duration;

use anyhow::Result;
use claimdesk_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use claimdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
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

    // Bootstrap with the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = routes::router(
        routes::ApiState {
            lifecycle: app.lifecycle.clone(),
            users: app.users.clone(),
            categories: app.categories.clone(),
        },
        &app.config.cors,
    )
    .merge(health::router(app.db_pool.clone()));

    let listen_addr =
        format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        listen_addr = %listen_addr,
        "claimdesk-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(grace))
        .await?;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "claimdesk-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown(grace: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "shutdown signal received, draining connections"
    );
}
