//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use cliptrim_engine::{EngineConfig, ProgressBus, TaskOrchestrator};
use cliptrim_media::{locate_tool, ProcessStageRunner, StageRunner};

use crate::config::ApiConfig;

/// Where the external tools were found at startup.
#[derive(Debug, Clone, Default)]
pub struct ToolStatus {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

impl ToolStatus {
    /// Look up the configured executables. Missing tools are logged, not
    /// fatal; tasks using them fail at spawn time.
    pub fn probe(engine: &EngineConfig) -> Self {
        let find = |name: &str| match locate_tool(name) {
            Ok(path) => {
                info!(tool = name, path = %path.display(), "Found external tool");
                Some(path)
            }
            Err(e) => {
                warn!(tool = name, "{}; tasks will fail until it is installed", e);
                None
            }
        };

        Self {
            ytdlp: find(&engine.ytdlp_path),
            ffmpeg: find(&engine.ffmpeg_path),
        }
    }

    pub fn all_available(&self) -> bool {
        self.ytdlp.is_some() && self.ffmpeg.is_some()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: Arc<EngineConfig>,
    pub bus: Arc<ProgressBus>,
    pub orchestrator: TaskOrchestrator,
    pub tools: Arc<ToolStatus>,
}

impl AppState {
    /// Create state around an arbitrary stage runner.
    pub fn new(config: ApiConfig, engine: EngineConfig, runner: Arc<dyn StageRunner>) -> Self {
        let tools = ToolStatus::probe(&engine);
        let engine = Arc::new(engine);
        let bus = Arc::new(ProgressBus::new());
        let orchestrator = TaskOrchestrator::new(engine.clone(), bus.clone(), runner);

        Self {
            config,
            engine,
            bus,
            orchestrator,
            tools: Arc::new(tools),
        }
    }

    /// Create state that runs real subprocesses.
    pub fn with_process_runner(config: ApiConfig, engine: EngineConfig) -> Self {
        let runner = ProcessStageRunner::new()
            .with_timeout(engine.stage_timeout)
            .with_tail_chars(engine.stderr_tail_chars);
        Self::new(config, engine, Arc::new(runner))
    }
}
