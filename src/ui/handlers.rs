//! REST handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::protocol::ControlMessage;
use crate::session::MonitoringStatus;
use crate::telemetry::{ChannelLevels, MasterLevels, TelemetrySnapshot};
use crate::ui::server::AppState;

type ApiError = (StatusCode, Json<ControlMessage>);

fn session_error(e: crate::Error) -> ApiError {
    tracing::warn!("Session request failed: {}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ControlMessage::Error { message: e.to_string() }),
    )
}

/// Full snapshot: every channel, master and engine metrics
pub async fn get_levels(State(state): State<Arc<AppState>>) -> Json<Arc<TelemetrySnapshot>> {
    Json(state.store.snapshot())
}

pub async fn get_master(State(state): State<Arc<AppState>>) -> Json<MasterLevels> {
    Json(state.store.get_master())
}

/// Unknown channels read as silence
pub async fn get_channel(State(state): State<Arc<AppState>>, Path(channel_id): Path<u32>) -> Json<ChannelLevels> {
    Json(state.store.get_channel(channel_id))
}

/// Tear down a channel's meter
pub async fn delete_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<u32>,
) -> Result<StatusCode, ApiError> {
    let removed = state.session.remove_channel(channel_id).await.map_err(session_error)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ControlMessage::Error {
                message: format!("channel {} has no meter", channel_id),
            }),
        ))
    }
}

pub async fn get_monitoring(State(state): State<Arc<AppState>>) -> Result<Json<MonitoringStatus>, ApiError> {
    state.session.status().await.map(Json).map_err(session_error)
}

pub async fn enable_monitoring(State(state): State<Arc<AppState>>) -> Result<Json<MonitoringStatus>, ApiError> {
    state.session.enable().await.map_err(session_error)?;
    state.broadcast_status().await;
    get_monitoring(State(state)).await
}

pub async fn disable_monitoring(State(state): State<Arc<AppState>>) -> Result<Json<MonitoringStatus>, ApiError> {
    state.session.disable().await.map_err(session_error)?;
    state.broadcast_status().await;
    get_monitoring(State(state)).await
}
