//! Periodic backstop for state that normal task cleanup missed.
//!
//! Each pass:
//! - evicts progress slots that have been terminal longer than the retention
//! - removes `temp_` files older than the sweep age from the work and output
//!   directories (left behind by crashes or interrupted downloads)

use std::sync::Arc;

use tokio::time::interval;
use tracing::{debug, info, warn};

use cliptrim_media::sweep_stale_artifacts;

use crate::config::EngineConfig;
use crate::metrics;
use crate::progress_bus::ProgressBus;

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub evicted_snapshots: usize,
    pub removed_files: usize,
    pub warnings: usize,
}

pub struct ArtifactSweeper {
    config: Arc<EngineConfig>,
    bus: Arc<ProgressBus>,
}

impl ArtifactSweeper {
    pub fn new(config: Arc<EngineConfig>, bus: Arc<ProgressBus>) -> Self {
        Self { config, bus }
    }

    /// Run forever; spawn as a background task.
    pub async fn run(&self) {
        info!(
            "Starting artifact sweeper (interval: {:?}, max age: {:?})",
            self.config.sweep_interval, self.config.sweep_max_age
        );

        let mut ticker = interval(self.config.sweep_interval);
        loop {
            ticker.tick().await;
            let stats = self.sweep_once().await;
            if stats != SweepStats::default() {
                info!(
                    evicted = stats.evicted_snapshots,
                    removed = stats.removed_files,
                    warnings = stats.warnings,
                    "Sweep finished"
                );
            } else {
                debug!("Sweep found nothing to do");
            }
        }
    }

    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats {
            evicted_snapshots: self.bus.evict_expired(self.config.snapshot_retention),
            ..Default::default()
        };

        let mut dirs = vec![&self.config.work_dir];
        if self.config.output_dir != self.config.work_dir {
            dirs.push(&self.config.output_dir);
        }

        for dir in dirs {
            let report = sweep_stale_artifacts(dir, self.config.sweep_max_age).await;
            for warning in &report.warnings {
                warn!("Sweep: {}", warning);
            }
            stats.removed_files += report.removed.len();
            stats.warnings += report.warnings.len();
        }

        metrics::record_cleanup_warnings(stats.warnings);
        stats
    }
}
