//! Control surface request handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::logging::{JournalEvent, ShutdownSource};
use crate::idle;
use crate::monitor::MonitorState;
use crate::power;

#[derive(Debug, Serialize)]
pub struct IdleTimeResponse {
    pub idle_time: u64,
}

#[derive(Debug, Serialize)]
pub struct SetLimitResponse {
    pub status: String,
    /// Echoes the number exactly as the caller sent it.
    pub new_limit: serde_json::Number,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub idle_limit: Option<f64>,
}

/// `GET /idle_time`: whole seconds since last operator input.
///
/// An unreadable probe reports 0 rather than an error.
pub async fn idle_time(State(state): State<AppState>) -> Json<IdleTimeResponse> {
    let idle_time = match idle::sample_blocking(&state.probe).await {
        Ok(idle) => idle.as_secs(),
        Err(e) => {
            warn!("Idle time unavailable for request: {}", e);
            0
        }
    };
    Json(IdleTimeResponse { idle_time })
}

/// `POST /set_idle_limit` with `{"limit": <number>}`.
pub async fn set_idle_limit(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<SetLimitResponse>> {
    let requested = parse_limit(&body)?;
    // Without arbitrary_precision every JSON number has an f64 view.
    let seconds = requested.as_f64().unwrap_or(f64::NAN);
    let limit = state.store.set(seconds)?;

    info!("Idle limit updated to {}", limit);
    state.journal.record(JournalEvent::LimitChanged {
        limit_seconds: limit.seconds(),
    });

    Ok(Json(SetLimitResponse {
        status: "Idle limit updated".to_string(),
        new_limit: requested,
    }))
}

/// Pull a numeric `limit` out of a JSON object body.
fn parse_limit(body: &[u8]) -> ApiResult<serde_json::Number> {
    let value: Value = serde_json::from_slice(body)?;
    match value.as_object().and_then(|fields| fields.get("limit")) {
        Some(Value::Number(limit)) => Ok(limit.clone()),
        _ => Err(ApiError::MissingLimit),
    }
}

/// `POST /shutdown`: power off now, independent of the monitor.
pub async fn shutdown(State(state): State<AppState>) -> ApiResult<Json<StatusMessage>> {
    warn!("Manual shutdown requested");
    let result = power::trigger_blocking(&state.action).await;

    state.journal.record(JournalEvent::ShutdownRequested {
        source: ShutdownSource::Manual,
        idle_seconds: None,
        limit_seconds: None,
        success: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
    });
    result?;

    Ok(Json(StatusMessage {
        status: "System shutting down...".to_string(),
    }))
}

/// `GET /status`: monitor state and current limit.
pub async fn status(State(state): State<AppState>) -> Json<MonitorStatus> {
    let monitor_state = *state.monitor_state.borrow();
    Json(MonitorStatus {
        state: monitor_state,
        idle_limit: state.store.get().map(|limit| limit.seconds()),
    })
}
