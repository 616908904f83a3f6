//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cliptrim_api::{create_router, metrics, ApiConfig, AppState};
use cliptrim_engine::{ArtifactSweeper, EngineConfig, ProgressBus};

fn init_tracing() -> anyhow::Result<()> {
    // JSON for log shippers, ANSI for terminals
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("cliptrim=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting cliptrim-api");

    let config = ApiConfig::from_env();
    let engine = EngineConfig::from_env();
    info!(
        "API config: host={}, port={}, work_dir={}, output_dir={}",
        config.host,
        config.port,
        engine.work_dir.display(),
        engine.output_dir.display()
    );

    engine
        .ensure_dirs()
        .await
        .context("Failed to create work/output directories")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::with_process_runner(config.clone(), engine);

    let sweeper = ArtifactSweeper::new(Arc::clone(&state.engine), Arc::clone(&state.bus));
    let sweeper_task = tokio::spawn(async move { sweeper.run().await });

    let bus = Arc::clone(&state.bus);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(bus))
        .await
        .context("Server error")?;

    sweeper_task.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, then end every open progress stream so graceful
/// shutdown is not held up by idle SSE connections.
async fn shutdown_signal(bus: Arc<ProgressBus>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
    bus.shutdown();
}
