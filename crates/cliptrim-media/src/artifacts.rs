//! Artifact bookkeeping: locating what the downloader actually wrote, and
//! removing temporary files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

pub use cliptrim_models::TEMP_PREFIX;

/// Extensions the downloader may produce for a fetched artifact.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "m4a", "webm", "mkv", "mov", "m4v", "flv", "mp3", "opus", "ogg", "aac", "wav",
];

/// Find the file the downloader actually produced for `intended`.
///
/// yt-dlp may decorate the name (format ids, a different container). An exact
/// match wins. Otherwise, files in the same directory whose name starts with
/// the intended stem and carries a known media extension are candidates;
/// the intended extension is preferred, then the largest file. With no
/// candidates the intended path is returned unchanged and the caller's
/// existence check fails.
pub async fn resolve_fetched_artifact(intended: &Path) -> PathBuf {
    if fs::metadata(intended).await.map(|m| m.is_file()).unwrap_or(false) {
        return intended.to_path_buf();
    }

    let (Some(dir), Some(stem)) = (intended.parent(), intended.file_stem().and_then(|s| s.to_str()))
    else {
        return intended.to_path_buf();
    };
    let wanted_ext = intended.extension().and_then(|e| e.to_str()).unwrap_or_default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "Cannot list fetch directory: {}", e);
            return intended.to_path_buf();
        }
    };

    let mut candidates: Vec<(PathBuf, bool, u64)> = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(stem) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !MEDIA_EXTENSIONS.contains(&ext) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() {
            candidates.push((path.clone(), ext == wanted_ext, meta.len()));
        }
    }

    let chosen = candidates
        .into_iter()
        .max_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)).then_with(|| b.0.cmp(&a.0)))
        .map(|(path, _, _)| path);

    match chosen {
        Some(path) => {
            debug!(intended = %intended.display(), resolved = %path.display(), "Resolved fetched artifact");
            path
        }
        None => intended.to_path_buf(),
    }
}

/// A file that could not be removed. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not remove {}: {}", self.path.display(), self.reason)
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    fn warn(&mut self, path: &Path, reason: impl fmt::Display) {
        let warning = CleanupWarning {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        warn!(path = %path.display(), "Cleanup warning: {}", warning.reason);
        self.warnings.push(warning);
    }

    fn merge(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.warnings.extend(other.warnings);
    }
}

/// Remove every file in `dir` whose name starts with one of `prefixes`,
/// except `keep`.
///
/// Each removal is attempted independently; failures become warnings.
pub async fn cleanup_task_artifacts(dir: &Path, prefixes: &[String], keep: Option<&Path>) -> CleanupReport {
    let prefixes: Vec<&str> = prefixes.iter().map(String::as_str).filter(|p| !p.is_empty()).collect();
    remove_matching(dir, |name, _| prefixes.iter().any(|p| name.starts_with(p)), keep).await
}

/// Remove `temp_`-prefixed files in `dir` last modified more than `max_age`
/// ago.
pub async fn sweep_stale_artifacts(dir: &Path, max_age: Duration) -> CleanupReport {
    let now = SystemTime::now();
    remove_matching(
        dir,
        |name, modified| {
            name.starts_with(TEMP_PREFIX)
                && modified
                    .and_then(|m| now.duration_since(m).ok())
                    .is_some_and(|age| age > max_age)
        },
        None,
    )
    .await
}

async fn remove_matching<F>(dir: &Path, matches: F, keep: Option<&Path>) -> CleanupReport
where
    F: Fn(&str, Option<SystemTime>) -> bool,
{
    let mut report = CleanupReport::default();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.warn(dir, e);
            return report;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                report.warn(dir, e);
                break;
            }
        };

        let path = entry.path();
        if keep.is_some_and(|k| k == path.as_path()) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                report.warn(&path, e);
                continue;
            }
        };
        if !matches(name, meta.modified().ok()) {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed temporary file");
                report.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => report.warn(&path, e),
        }
    }

    report
}

/// Run [`cleanup_task_artifacts`] over several directories.
pub async fn cleanup_in_dirs(dirs: &[&Path], prefixes: &[String], keep: Option<&Path>) -> CleanupReport {
    let mut report = CleanupReport::default();
    for dir in dirs {
        report.merge(cleanup_task_artifacts(dir, prefixes, keep).await);
    }
    report
}
