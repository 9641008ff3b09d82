//! precis backend server
//!
//! Loads configuration, wires the summarization components together, restores
//! the job backlog and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use precis_backend::bootstrap::{build_components, worker_pool_config};
use precis_backend::maintenance::Maintenance;
use precis_backend::state::AppState;
use precis_backend::build_router;
use precis_job_queue::WorkerPool;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

mod cli;
mod config_helpers;
mod tracing_setup;

use cli::CliArgs;
use config_helpers::{maintenance_interval, parse_bind_address, snapshot_path};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = CliArgs::parse().resolve_config_path();

    let config = load_config(config_path.as_deref())?;
    precis_config::validate_config(&config)?;

    install_tracing_from_config(&config.logging);
    tracing::info!(config_path = config_path.as_deref().unwrap_or("-"), "configuration loaded");

    let components = build_components(&config)?;
    let snapshot = snapshot_path(&config);
    if let Some(path) = &snapshot {
        match components.queue.load_snapshot(path).await {
            Ok(restored) => tracing::info!(path = %path.display(), restored, "job backlog restored"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "could not restore job backlog, starting empty"),
        }
    }

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::spawn(
        components.queue.clone(),
        components.executor.clone(),
        worker_pool_config(&config),
        shutdown.child_token(),
    );
    let maintenance = Maintenance {
        queue: components.queue.clone(),
        memory_cache: components.memory_cache.clone(),
        snapshot_path: snapshot,
        interval: maintenance_interval(&config),
    };
    let maintenance_task = maintenance.clone().spawn(shutdown.child_token());

    let app = build_router(Arc::new(AppState::new(components.service)));

    let addr = parse_bind_address(&config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
            signal.cancel();
        })
        .await?;

    // in-flight jobs finish before the final snapshot is written
    shutdown.cancel();
    pool.shutdown().await;
    if let Err(e) = maintenance_task.await {
        tracing::warn!(error = %e, "maintenance task ended abnormally");
    }
    maintenance.save_snapshot().await;
    tracing::info!("server stopped");

    Ok(())
}

/// Load configuration from file or defaults.
fn load_config(path: Option<&str>) -> anyhow::Result<precis_config::Config> {
    precis_config::load_config(path).map_err(|e| {
        eprintln!("failed to load configuration: {e}");
        anyhow::anyhow!(e.to_string())
    })
}
