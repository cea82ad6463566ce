//! HTTP control surface.
//!
//! Reads idle time straight from the probe, reads and writes the shared
//! threshold store, and exposes a manual shutdown that bypasses the monitor.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::{IdleTimeResponse, MonitorStatus, SetLimitResponse, StatusMessage};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::idle::IdleProbe;
use crate::logging::Journal;
use crate::monitor::MonitorState;
use crate::power::ShutdownAction;
use crate::threshold::ThresholdStore;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ThresholdStore>,
    pub probe: Arc<dyn IdleProbe>,
    pub action: Arc<dyn ShutdownAction>,
    pub monitor_state: watch::Receiver<MonitorState>,
    pub journal: Journal,
}

/// Build the control surface router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/idle_time", get(handlers::idle_time))
        .route("/set_idle_limit", post(handlers::set_idle_limit))
        .route("/shutdown", post(handlers::shutdown))
        .route("/status", get(handlers::status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control surface until `cancel` fires.
pub async fn serve(config: &ServerConfig, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control surface on {addr}"))?;
    let local_addr = listener.local_addr()?;
    info!("Control surface listening on {local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("Control surface server error")?;

    info!("Control surface stopped");
    Ok(())
}
