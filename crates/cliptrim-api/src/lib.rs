//! Axum HTTP API server.
//!
//! This crate provides:
//! - Clip submission, snapshot polling and an SSE progress stream
//! - One-shot artifact download
//! - Per-IP rate limiting on submission and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod sse;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, ToolStatus};
