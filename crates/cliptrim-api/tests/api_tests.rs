//! API integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use cliptrim_api::{create_router, ApiConfig, AppState};
use cliptrim_engine::EngineConfig;
use cliptrim_media::{MediaResult, Stage, StageCommand, StageEvent, StageResult, StageRunner};
use cliptrim_models::{ProgressEvent, TaskId, TaskStatus};

/// Writes whatever file each stage is asked for and exits 0.
struct InstantRunner;

#[async_trait]
impl StageRunner for InstantRunner {
    async fn run(
        &self,
        command: &StageCommand,
        on_event: &mut (dyn FnMut(StageEvent) + Send),
    ) -> MediaResult<StageResult> {
        on_event(StageEvent::Progress(100.0));
        let output = match command.stage {
            Stage::Fetch => {
                let idx = command.args.iter().position(|a| a == "-o").unwrap();
                command.args[idx + 1].clone()
            }
            Stage::Cut => command.args.last().unwrap().clone(),
        };
        tokio::fs::write(output, b"media").await?;
        Ok(StageResult {
            exit_code: Some(0),
            stderr_tail: String::new(),
        })
    }
}

struct TestApp {
    _root: TempDir,
    state: AppState,
    router: Router,
}

fn test_app(config: ApiConfig) -> TestApp {
    let root = TempDir::new().unwrap();
    let engine = EngineConfig {
        work_dir: root.path().join("work"),
        output_dir: root.path().join("output"),
        ..Default::default()
    };
    std::fs::create_dir_all(&engine.output_dir).unwrap();

    let state = AppState::new(config, engine, Arc::new(InstantRunner));
    let router = create_router(state.clone(), None);
    TestApp {
        _root: root,
        state,
        router,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn detail(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["detail"].as_str().unwrap().to_string()
}

fn valid_clip() -> Value {
    json!({
        "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "start": "00:00:10",
        "end": "00:00:20",
        "filename": "demo"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(ApiConfig::default());
    let (status, headers, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert!(value["tools"]["ffmpeg"].is_boolean());
}

#[tokio::test]
async fn test_submit_rejects_reversed_range() {
    let app = test_app(ApiConfig::default());
    let mut clip = valid_clip();
    clip["start"] = json!("00:04:00");
    clip["end"] = json!("00:03:00");

    let (status, _, body) = send(&app.router, post_json("/api/clips", clip)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!detail(&body).is_empty());
    assert!(app.state.bus.is_empty());
}

#[tokio::test]
async fn test_submit_rejects_unknown_host_and_bad_json() {
    let app = test_app(ApiConfig::default());
    let mut clip = valid_clip();
    clip["url"] = json!("http://127.0.0.1/video.mp4");
    let (status, _, _) = send(&app.router, post_json("/api/clips", clip)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/api/clips")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!detail(&body).is_empty());
}

#[tokio::test]
async fn test_submit_then_stream_to_completion() {
    let app = test_app(ApiConfig::default());

    let (status, _, body) = send(&app.router, post_json("/api/clips", valid_clip())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let value: Value = serde_json::from_slice(&body).unwrap();
    let task_id = value["taskId"].as_str().unwrap().to_string();
    assert!(TaskId::parse(&task_id).is_some());

    // The stream closes after the terminal event.
    let (status, headers, body) = send(&app.router, get(&format!("/api/clips/{}/events", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("\"status\":\"complete\""));

    // Re-subscribing to a finished task yields the snapshot immediately.
    let (_, _, body) = send(&app.router, get(&format!("/api/clips/{}/events", task_id))).await;
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.matches("data:").count(), 1);
    assert!(text.contains("\"progress\":100"));

    let (status, _, body) = send(&app.router, get(&format!("/api/clips/{}", task_id))).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: ProgressEvent = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot.status, TaskStatus::Complete);
    let filename = snapshot.filename.unwrap();
    assert!(filename.starts_with("demo_"));
    assert!(filename.ends_with(".mp4"));
}

#[tokio::test]
async fn test_snapshot_unknown_task() {
    let app = test_app(ApiConfig::default());
    let (status, _, _) = send(&app.router, get(&format!("/api/clips/{}", TaskId::new()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app.router, get("/api/clips/not-a-task")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app.router, get(&format!("/api/clips/{}/events", TaskId::new()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_served_exactly_once() {
    let app = test_app(ApiConfig::default());
    let path = app.state.engine.output_dir.join("demo_abc.mp4");
    std::fs::write(&path, b"clip bytes").unwrap();

    let (status, headers, body) = send(&app.router, get("/api/download/demo_abc.mp4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"clip bytes");
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "video/mp4");
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"demo_abc.mp4\""
    );
    assert!(!path.exists());

    let (status, _, body) = send(&app.router, get("/api/download/demo_abc.mp4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(detail(&body), "File not found");
}

#[tokio::test]
async fn test_download_kept_when_deletion_disabled() {
    let app = test_app(ApiConfig {
        delete_after_download: false,
        ..Default::default()
    });
    let path = app.state.engine.output_dir.join("demo_abc.mp3");
    std::fs::write(&path, b"audio").unwrap();

    for _ in 0..2 {
        let (status, headers, _) = send(&app.router, get("/api/download/demo_abc.mp3")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
    }
    assert!(path.exists());
}

#[tokio::test]
async fn test_download_rejects_unsafe_names() {
    let app = test_app(ApiConfig::default());

    for name in ["..%2F..%2Fetc%2Fpasswd", "..secret.mp4", ".hidden"] {
        let (status, _, _) = send(&app.router, get(&format!("/api/download/{}", name))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
    }

    std::fs::write(app.state.engine.output_dir.join("temp_x_cut.mp4"), b"x").unwrap();
    let (status, _, _) = send(&app.router, get("/api/download/temp_x_cut.mp4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submission_rate_limited_per_ip() {
    let app = test_app(ApiConfig {
        rate_limit_rps: 1,
        ..Default::default()
    });

    let request = || {
        let mut request = post_json("/api/clips", valid_clip());
        request
            .headers_mut()
            .insert("X-Forwarded-For", "203.0.113.9".parse().unwrap());
        request
    };

    let (status, _, _) = send(&app.router, request()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, headers, _) = send(&app.router, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "1");

    // Polling is not limited
    let (status, _, _) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_shutdown_ends_streams() {
    let app = test_app(ApiConfig::default());
    let task_id = TaskId::new();
    app.state.bus.register(&task_id);

    let router = app.router.clone();
    let uri = format!("/api/clips/{}/events", task_id);
    let stream = tokio::spawn(async move { send(&router, get(&uri)).await });

    // Let the handler attach before tearing down.
    while app.state.bus.active_subscribers() == 0 {
        tokio::task::yield_now().await;
    }
    app.state.bus.shutdown();

    let (status, _, body) = stream.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("\"status\":\"starting\""));
}

#[tokio::test]
async fn test_clip_named_temp_is_downloadable() {
    let app = test_app(ApiConfig::default());
    let mut clip = valid_clip();
    clip["filename"] = json!("temp");

    let (status, _, body) = send(&app.router, post_json("/api/clips", clip)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let value: Value = serde_json::from_slice(&body).unwrap();
    let task_id = value["taskId"].as_str().unwrap().to_string();

    let (_, _, body) = send(&app.router, get(&format!("/api/clips/{}/events", task_id))).await;
    assert!(String::from_utf8(body).unwrap().contains("\"status\":\"complete\""));

    let (_, _, body) = send(&app.router, get(&format!("/api/clips/{}", task_id))).await;
    let snapshot: ProgressEvent = serde_json::from_slice(&body).unwrap();
    let filename = snapshot.filename.unwrap();
    assert!(!filename.starts_with("temp_"));

    let (status, _, body) = send(&app.router, get(&format!("/api/download/{}", filename))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"media");
}
