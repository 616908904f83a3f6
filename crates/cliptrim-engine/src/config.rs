//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for in-flight downloads and cuts
    pub work_dir: PathBuf,
    /// Directory finished clips are moved into
    pub output_dir: PathBuf,
    /// Downloader executable (name on PATH or absolute path)
    pub ytdlp_path: String,
    /// Cutter executable
    pub ffmpeg_path: String,
    /// Per-stage wall clock limit
    pub stage_timeout: Duration,
    /// How long a terminal snapshot stays queryable
    pub snapshot_retention: Duration,
    pub sweep_interval: Duration,
    /// Age after which leftover temp files are swept
    pub sweep_max_age: Duration,
    /// Diagnostic characters kept from a failed stage
    pub stderr_tail_chars: usize,
    /// Resolution cap when a video request names none
    pub default_quality: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/cliptrim/work"),
            output_dir: PathBuf::from("/tmp/cliptrim/output"),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            stage_timeout: Duration::from_secs(1800),
            snapshot_retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(600),
            sweep_max_age: Duration::from_secs(3600),
            stderr_tail_chars: 400,
            default_quality: 1080,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("CLIPTRIM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("CLIPTRIM_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            stage_timeout: env_secs("STAGE_TIMEOUT_SECS").unwrap_or(defaults.stage_timeout),
            snapshot_retention: env_secs("SNAPSHOT_RETENTION_SECS")
                .unwrap_or(defaults.snapshot_retention),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
            sweep_max_age: env_secs("SWEEP_MAX_AGE_SECS").unwrap_or(defaults.sweep_max_age),
            stderr_tail_chars: std::env::var("STDERR_TAIL_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stderr_tail_chars),
            default_quality: std::env::var("DEFAULT_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_quality),
        }
    }

    /// Create the work and output directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stage_timeout, Duration::from_secs(1800));
        assert_eq!(config.stderr_tail_chars, 400);
        assert_eq!(config.default_quality, 1080);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[tokio::test]
    async fn test_ensure_dirs() {
        let root = tempfile::TempDir::new().unwrap();
        let config = EngineConfig {
            work_dir: root.path().join("work"),
            output_dir: root.path().join("out"),
            ..Default::default()
        };
        config.ensure_dirs().await.unwrap();
        assert!(config.work_dir.is_dir());
        assert!(config.output_dir.is_dir());
    }
}
