//! Clip task engine.
//!
//! Owns the per-task state machine (fetch, cut, cleanup), the process-wide
//! progress registry clients subscribe to, and the background sweeper.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod progress_bus;
pub mod sweeper;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use logging::TaskLogger;
pub use orchestrator::{scale_download_percent, TaskOrchestrator, TaskPaths};
pub use progress_bus::{ProgressBus, Subscription};
pub use sweeper::{ArtifactSweeper, SweepStats};
