//! Clip task orchestration.
//!
//! One task runs `starting -> downloading -> trimming -> cleaning -> complete`,
//! or ends in `error` from any non-terminal state. Every transition is
//! published to the [`ProgressBus`]. Reported progress never decreases until
//! the terminal event; failures report 0.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::Instrument;

use cliptrim_media::{
    cleanup_in_dirs, cut_command, fetch_command, move_file, resolve_fetched_artifact, MediaError,
    Stage, StageEvent, StageRunner,
};
use cliptrim_models::{format_seconds, ClipRequest, ProgressEvent, TaskId, TaskStatus, ValidatedClip};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::TaskLogger;
use crate::metrics;
use crate::progress_bus::ProgressBus;

const DOWNLOAD_START: u8 = 5;
const DOWNLOAD_END: u8 = 65;
const TRIM_START: u8 = 70;
const TRIM_ACTIVE: u8 = 82;
const TRIM_DONE: u8 = 95;
const CLEANING: u8 = 96;

/// Map a raw downloader percentage onto the `downloading` range:
/// `min(5 + p * 0.6, 65)`, floored.
pub fn scale_download_percent(raw: f64) -> u8 {
    let raw = if raw.is_finite() { raw.clamp(0.0, 100.0) } else { 0.0 };
    let scaled = (DOWNLOAD_START as f64 + raw * 0.6).min(DOWNLOAD_END as f64);
    scaled.floor() as u8
}

/// On-disk names for one task. Every name embeds the full task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPaths {
    /// Base name (no extension) given to the downloader
    pub temp_base: String,
    /// Intended downloader output
    pub fetch: PathBuf,
    /// Cutter output, before the move
    pub cut: PathBuf,
    pub final_name: String,
    pub final_path: PathBuf,
}

impl TaskPaths {
    pub fn new(config: &EngineConfig, task_id: &TaskId, clip: &ValidatedClip) -> Self {
        let prefix = task_id.temp_prefix();
        let temp_base = format!("{}_source", prefix);
        let final_ext = clip.format.final_extension();
        let final_name = format!("{}_{}.{}", clip.file_stem, task_id, final_ext);

        Self {
            fetch: config
                .work_dir
                .join(format!("{}.{}", temp_base, clip.format.fetch_extension())),
            cut: config.work_dir.join(format!("{}_cut.{}", prefix, final_ext)),
            final_path: config.output_dir.join(&final_name),
            final_name,
            temp_base,
        }
    }
}

/// Publishes one task's events and keeps its percentage non-decreasing.
struct ProgressReporter {
    bus: Arc<ProgressBus>,
    task_id: TaskId,
    last: u8,
    trim_active: bool,
}

impl ProgressReporter {
    fn new(bus: Arc<ProgressBus>, task_id: TaskId) -> Self {
        Self {
            bus,
            task_id,
            last: 0,
            trim_active: false,
        }
    }

    fn advance(&mut self, status: TaskStatus, progress: u8, message: impl Into<String>) {
        let progress = progress.max(self.last);
        self.last = progress;
        self.bus
            .publish(&self.task_id, ProgressEvent::new(status, progress, message));
    }

    /// Forward a raw downloader percentage only when it moves the bar.
    fn download(&mut self, raw: f64) {
        let scaled = scale_download_percent(raw);
        if scaled > self.last {
            self.advance(
                TaskStatus::Downloading,
                scaled,
                format!("Downloading: {:.0}%", raw.clamp(0.0, 100.0)),
            );
        }
    }

    /// The cutter gives no usable percentage; the first sign of life moves
    /// the bar to the midpoint once.
    fn trim_activity(&mut self) {
        if !self.trim_active {
            self.trim_active = true;
            self.advance(TaskStatus::Trimming, TRIM_ACTIVE, "Trimming clip");
        }
    }

    fn finish(&mut self, event: ProgressEvent) {
        self.last = event.progress;
        self.bus.publish(&self.task_id, event);
    }
}

/// Drives clip tasks in the background.
#[derive(Clone)]
pub struct TaskOrchestrator {
    config: Arc<EngineConfig>,
    bus: Arc<ProgressBus>,
    runner: Arc<dyn StageRunner>,
}

impl TaskOrchestrator {
    pub fn new(config: Arc<EngineConfig>, bus: Arc<ProgressBus>, runner: Arc<dyn StageRunner>) -> Self {
        Self { config, bus, runner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Validate a request, create its task and start it in the background.
    ///
    /// Returns as soon as the task is registered. Validation failures create
    /// nothing.
    pub fn submit(&self, request: &ClipRequest) -> EngineResult<TaskId> {
        let (task_id, clip) = self.prepare(request)?;

        let span = TaskLogger::new(&task_id, clip.format).create_span();
        let this = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move { this.run(id, clip).await }.instrument(span));

        Ok(task_id)
    }

    /// Validate and register without starting; pair with [`Self::run`].
    pub fn prepare(&self, request: &ClipRequest) -> EngineResult<(TaskId, ValidatedClip)> {
        let clip = request.validate(self.config.default_quality)?;
        let task_id = TaskId::new();
        self.bus.register(&task_id);
        metrics::record_task_submitted(clip.format.as_str());
        Ok((task_id, clip))
    }

    /// Run a registered task to its terminal state and return the terminal
    /// event. Intermediates are removed whether or not the task succeeds.
    pub async fn run(&self, task_id: TaskId, clip: ValidatedClip) -> ProgressEvent {
        let logger = TaskLogger::new(&task_id, clip.format);
        let paths = TaskPaths::new(&self.config, &task_id, &clip);
        let mut reporter = ProgressReporter::new(self.bus.clone(), task_id.clone());

        logger.log_start(&format!(
            "{} from {} to {} ({}s)",
            clip.url,
            format_seconds(clip.start_secs),
            format_seconds(clip.end_secs),
            clip.duration_secs
        ));

        let event = match self.drive(&clip, &paths, &mut reporter, &logger).await {
            Ok(()) => {
                logger.log_completion(&paths.final_name);
                metrics::record_task_completed(clip.format.as_str());
                ProgressEvent::complete(paths.final_name.clone())
            }
            Err(err) => {
                logger.log_error(&err.to_string());
                metrics::record_task_failed(failure_reason(&err));
                self.cleanup(&task_id, &paths, None, &logger).await;
                remove_if_present(&paths.final_path).await;
                ProgressEvent::error(err.to_string())
            }
        };

        reporter.finish(event.clone());
        event
    }

    async fn drive(
        &self,
        clip: &ValidatedClip,
        paths: &TaskPaths,
        reporter: &mut ProgressReporter,
        logger: &TaskLogger,
    ) -> EngineResult<()> {
        self.config.ensure_dirs().await?;

        // Fetch
        reporter.advance(TaskStatus::Downloading, DOWNLOAD_START, "Downloading source");
        logger.log_stage(Stage::Fetch.as_str(), "launching downloader");
        let fetch = fetch_command(
            &self.config.ytdlp_path,
            &clip.url,
            &paths.fetch,
            clip.format,
            clip.quality,
        );
        self.runner
            .run(&fetch, &mut |event| {
                if let StageEvent::Progress(raw) = event {
                    reporter.download(raw);
                }
            })
            .await?
            .ensure_success(Stage::Fetch)?;

        let source = resolve_fetched_artifact(&paths.fetch).await;
        require_file(&source).await?;

        // Cut
        reporter.advance(TaskStatus::Trimming, TRIM_START, "Trimming clip");
        logger.log_stage(Stage::Cut.as_str(), &format!("cutting {}", source.display()));
        let cut = cut_command(
            &self.config.ffmpeg_path,
            &source,
            &paths.cut,
            clip.start_secs,
            clip.duration_secs,
            clip.format,
        );
        self.runner
            .run(&cut, &mut |_| reporter.trim_activity())
            .await?
            .ensure_success(Stage::Cut)?;
        require_file(&paths.cut).await?;
        reporter.advance(TaskStatus::Trimming, TRIM_DONE, "Trim finished");

        move_file(&paths.cut, &paths.final_path).await?;

        // Cleanup
        reporter.advance(TaskStatus::Cleaning, CLEANING, "Cleaning up");
        let task_id = reporter.task_id.clone();
        self.cleanup(&task_id, paths, Some(&paths.final_path), logger).await;

        require_file(&paths.final_path).await
    }

    async fn cleanup(&self, task_id: &TaskId, paths: &TaskPaths, keep: Option<&Path>, logger: &TaskLogger) {
        let prefixes = [paths.temp_base.clone(), task_id.temp_prefix()];
        let mut dirs = vec![self.config.work_dir.as_path()];
        if self.config.output_dir != self.config.work_dir {
            dirs.push(self.config.output_dir.as_path());
        }

        let report = cleanup_in_dirs(&dirs, &prefixes, keep).await;
        for warning in &report.warnings {
            logger.log_warning(&warning.to_string());
        }
        metrics::record_cleanup_warnings(report.warnings.len());
    }
}

async fn require_file(path: &Path) -> EngineResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(MediaError::artifact_missing(path).into()),
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "Failed to remove output of failed task: {}", e);
        }
    }
}

fn failure_reason(err: &EngineError) -> &'static str {
    match err {
        EngineError::Validation(_) => "validation",
        EngineError::Media(MediaError::StageSpawn { .. }) => "stage_spawn",
        EngineError::Media(MediaError::StageFailed { .. }) => "stage_failed",
        EngineError::Media(MediaError::Timeout { .. }) => "timeout",
        EngineError::Media(MediaError::ArtifactMissing(_)) => "artifact_missing",
        EngineError::Media(_) | EngineError::Io(_) => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cliptrim_models::OutputFormat;

    #[test]
    fn test_scaling_law() {
        assert_eq!(scale_download_percent(0.0), 5);
        assert_eq!(scale_download_percent(50.0), 35);
        assert_eq!(scale_download_percent(100.0), 65);
        assert_eq!(scale_download_percent(250.0), 65);
        assert_eq!(scale_download_percent(-3.0), 5);
        assert_eq!(scale_download_percent(f64::NAN), 5);
    }

    #[test]
    fn test_reporter_never_regresses() {
        let bus = Arc::new(ProgressBus::new());
        let id = TaskId::new();
        bus.register(&id);
        let mut reporter = ProgressReporter::new(bus.clone(), id.clone());

        reporter.download(50.0);
        reporter.download(20.0);
        reporter.download(50.0);
        assert_eq!(bus.snapshot(&id).unwrap().progress, 35);

        reporter.advance(TaskStatus::Trimming, 10, "late");
        assert_eq!(bus.snapshot(&id).unwrap().progress, 35);
    }

    #[test]
    fn test_trim_activity_fires_once() {
        let bus = Arc::new(ProgressBus::new());
        let id = TaskId::new();
        bus.register(&id);
        let mut sub = bus.subscribe(&id).unwrap();
        let mut reporter = ProgressReporter::new(bus.clone(), id.clone());

        reporter.advance(TaskStatus::Trimming, TRIM_START, "Trimming clip");
        reporter.trim_activity();
        reporter.trim_activity();

        let seen: Vec<u8> = std::iter::from_fn(|| sub.receiver.try_recv().ok())
            .map(|e| e.progress)
            .collect();
        assert_eq!(seen, vec![0, 70, 82]);
    }

    #[test]
    fn test_task_paths_embed_task_id() {
        let config = EngineConfig {
            work_dir: PathBuf::from("/w"),
            output_dir: PathBuf::from("/o"),
            ..Default::default()
        };
        let id = TaskId::parse("0123456789abcdef0123456789abcdef").unwrap();
        let clip = ValidatedClip {
            url: "https://youtu.be/x".to_string(),
            start_secs: 1,
            end_secs: 2,
            duration_secs: 1,
            file_stem: "clip".to_string(),
            format: OutputFormat::Audio,
            quality: None,
        };

        let paths = TaskPaths::new(&config, &id, &clip);
        assert_eq!(paths.temp_base, "temp_0123456789abcdef0123456789abcdef_source");
        assert_eq!(paths.fetch, PathBuf::from("/w/temp_0123456789abcdef0123456789abcdef_source.m4a"));
        assert_eq!(paths.cut, PathBuf::from("/w/temp_0123456789abcdef0123456789abcdef_cut.mp3"));
        assert_eq!(paths.final_name, "clip_0123456789abcdef0123456789abcdef.mp3");
        assert_eq!(paths.final_path, PathBuf::from("/o/clip_0123456789abcdef0123456789abcdef.mp3"));
    }
}
