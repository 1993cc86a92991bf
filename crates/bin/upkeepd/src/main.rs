//! # upkeepd — upkeep daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`upkeep.toml`, environment overrides)
//! - Initialise tracing from the configured filter
//! - Open the `SQLite` pool and run migrations
//! - Build the engine over the storage, entity cache, directory and
//!   command sink adapters, load its state and start its loops
//! - Serve the HTTP API until SIGINT/SIGTERM, then stop the engine
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use upkeep_adapter_http_axum::router;
use upkeep_adapter_http_axum::state::AppState;
use upkeep_adapter_local::{LocalCommandSink, LogProvider, SnapshotCache, StaticDirectory};
use upkeep_adapter_storage_sqlite_sqlx::SqliteKeyValueStore;
use upkeep_app::engine::Engine;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}", config.logging.filter);
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Database
    let db = upkeep_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
    }
    .build()
    .await
    .context("failed to open database")?;
    let store = Arc::new(SqliteKeyValueStore::new(db.pool().clone()));

    // Local adapters
    let entities = Arc::new(SnapshotCache::new());
    let directory = Arc::new(StaticDirectory::new(
        config.directory.groups.clone(),
        config.directory.roles.clone(),
    ));
    let sink = Arc::new(LocalCommandSink::new(entities.clone()));

    // Engine
    let engine = Arc::new(Engine::new(
        store,
        entities,
        directory,
        sink,
        config.engine_settings()?,
    ));
    engine.load().await.context("failed to load engine state")?;
    let provider = Arc::new(LogProvider::new());
    for channel in &config.providers.log_channels {
        engine.set_provider(*channel, provider.clone()).await;
    }
    let handle = engine.start();

    // HTTP
    let app = router::build(AppState::new(engine.clone()));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "upkeepd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown requested");
}
