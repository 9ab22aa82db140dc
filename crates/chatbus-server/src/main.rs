//! # chatbus-server
//!
//! HTTP front end for the chat backend.
//!
//! This binary provides:
//! - **REST API** (axum) for users, sessions, contacts and messages
//! - **Cache rehydration** from the SQLite store before the first request
//! - **Write-behind persistence** of sent messages
//! - **Session culling** of clients that stopped polling

mod api;
mod config;
mod error;

use std::sync::Arc;

use chatbus_core::{Chat, Persistence, SessionCuller};
use chatbus_store::Database;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatbus_server=debug,chatbus_core=debug")),
        )
        .init();

    info!("Starting chatbus server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and rehydrate the caches
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    info!(path = %config.database_path.display(), "Database opened");

    let chat = Arc::new(Chat::new(config.chat.clone(), Persistence::new(db)));
    let report = chat.restore().await?;
    info!(?report, "Restore complete");

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    let cull_token = CancellationToken::new();
    let culler = SessionCuller::new(Arc::clone(&chat)).spawn(cull_token.clone());

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let app_state = AppState {
        chat: Arc::clone(&chat),
        config: Arc::new(config.clone()),
    };
    let served = api::serve(app_state, config.http_addr, shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server failed");
    }

    // -----------------------------------------------------------------------
    // 6. Shut down: stop culling, drain the queue, persist activity
    // -----------------------------------------------------------------------
    cull_token.cancel();
    if let Err(e) = culler.await {
        warn!(error = %e, "Session culler ended abnormally");
    }

    let stats = chat.shutdown().await?;
    info!(
        persisted = stats.persisted,
        failed = stats.failed,
        "Shutdown complete"
    );

    served
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
