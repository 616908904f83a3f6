//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `healthy` when both tools were found at startup, otherwise `degraded`
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub tools: ToolsResponse,
    /// Tasks with a live or retained progress snapshot
    pub tracked_tasks: usize,
}

#[derive(Serialize)]
pub struct ToolsResponse {
    pub ytdlp: bool,
    pub ffmpeg: bool,
}

/// Liveness endpoint. Always 200; tool absence only degrades the status.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.tools.all_available() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        tools: ToolsResponse {
            ytdlp: state.tools.ytdlp.is_some(),
            ffmpeg: state.tools.ffmpeg.is_some(),
        },
        tracked_tasks: state.bus.len(),
    })
}
