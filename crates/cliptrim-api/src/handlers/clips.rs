//! Clip submission and snapshot polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use cliptrim_models::{ClipRequest, ProgressEvent, TaskId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CreateClipResponse {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Validate a clip request and start it in the background.
///
/// Responds before any download starts; progress is read from the event
/// stream or the snapshot endpoint.
pub async fn create_clip(
    State(state): State<AppState>,
    payload: Result<Json<ClipRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateClipResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let task_id = state.orchestrator.submit(&request)?;
    info!(task_id = %task_id, format = %request.format, "Clip task accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateClipResponse {
            task_id: task_id.to_string(),
        }),
    ))
}

/// Latest progress snapshot for a task.
pub async fn get_clip_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<ProgressEvent>> {
    TaskId::parse(&task_id)
        .and_then(|id| state.bus.snapshot(&id))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Task not found"))
}
