use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState, SharedState};
use super::backend::LocalBackend;
use super::db::{BoardDb, DbHandle};

/// Configuration for the board server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub feed_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3142,
            db_path: PathBuf::from(".rmw/board.db"),
            dev_mode: false,
            feed_capacity: 256,
        }
    }
}

/// Open the database and wire up shared state.
pub fn build_state(config: &ServerConfig) -> Result<SharedState> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    let db = BoardDb::new(&config.db_path).context("Failed to initialize board database")?;
    Ok(Arc::new(AppState {
        backend: LocalBackend::new(DbHandle::new(db), config.feed_capacity),
    }))
}

/// Build the full application router: REST API plus the change feed socket.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let app = api::api_router().with_state(state);
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the board server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig, open_browser: bool) -> Result<()> {
    let state = build_state(&config)?;
    let app = build_router(state, config.dev_mode);

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    let url = format!("http://{}", local_addr);
    tracing::info!(%url, db = %config.db_path.display(), "RMW board running");
    println!("RMW board running at {}", url);

    if open_browser {
        if let Err(e) = open::that(format!("{}/api/requests", url)) {
            tracing::warn!(error = %e, "failed to open browser");
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
