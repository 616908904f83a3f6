//! Finished clip delivery.

use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cliptrim_media::TEMP_PREFIX;
use cliptrim_models::is_safe_filename;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

fn content_type_for(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Take exclusive ownership of a finished clip by renaming it to a private
/// `temp_` name. Only one concurrent request can win the rename.
async fn claim(output_dir: &FsPath, filename: &str) -> ApiResult<PathBuf> {
    let source = output_dir.join(filename);
    let claimed = output_dir.join(format!(
        "{}claim_{}_{}",
        TEMP_PREFIX,
        Uuid::new_v4().simple(),
        filename
    ));

    match fs::rename(&source, &claimed).await {
        Ok(()) => Ok(claimed),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::not_found("File not found")),
        Err(e) => Err(ApiError::internal(format!("Failed to claim {}: {}", filename, e))),
    }
}

/// Stream a finished clip as an attachment.
///
/// With delete-after-download enabled the clip is served at most once: it is
/// claimed before streaming and the claimed copy is removed when the body is
/// dropped, whether or not the client read it to the end.
pub async fn download_clip(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    if !is_safe_filename(&filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }
    // Intermediates are never downloadable
    if filename.starts_with(TEMP_PREFIX) {
        return Err(ApiError::not_found("File not found"));
    }

    let output_dir = &state.engine.output_dir;
    let path = if state.config.delete_after_download {
        claim(output_dir, &filename).await?
    } else {
        output_dir.join(&filename)
    };

    let file = match fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found"))
        }
        Err(e) => return Err(ApiError::internal(format!("Failed to open {}: {}", filename, e))),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .len();

    let stream = ReaderStream::new(file);
    let body = if state.config.delete_after_download {
        let guard = scopeguard::guard(path.clone(), |claimed| {
            tokio::spawn(async move {
                match fs::remove_file(&claimed).await {
                    Ok(()) => debug!(path = %claimed.display(), "Removed delivered clip"),
                    Err(e) => warn!(path = %claimed.display(), "Failed to remove delivered clip: {}", e),
                }
            });
        });
        Body::from_stream(stream.map(move |chunk| {
            let _claimed = &*guard;
            chunk
        }))
    } else {
        Body::from_stream(stream)
    };

    let extension = FsPath::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    metrics::record_download_served(extension);
    info!(filename = %filename, bytes = len, "Serving clip");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}
