//! Moving finished clips into the output directory.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::artifacts::TEMP_PREFIX;
use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move `src` to `dst`, creating the destination directory if needed.
///
/// A plain rename is tried first. When the two paths are on different
/// filesystems the file is copied next to `dst` under a `temp_` name and then
/// renamed into place, so `dst` never appears half-written. A crash midway
/// leaves only a `temp_` file for the sweeper.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            copy_into_place(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

async fn copy_into_place(src: &Path, dst: &Path) -> MediaResult<()> {
    let file_name = dst
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = dst.with_file_name(format!("{}move_{}", TEMP_PREFIX, file_name));

    if let Err(e) = fs::copy(src, &staging).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), "Source left behind after cross-device move: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_into_new_output_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp_abc_cut.mp4");
        let dst = dir.path().join("output").join("clip_abc.mp4");
        fs::write(&src, b"clip bytes").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"clip bytes");
    }

    #[tokio::test]
    async fn test_copy_into_place_removes_source_and_staging() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp_abc_cut.mp3");
        let dst = dir.path().join("song_abc.mp3");
        fs::write(&src, b"audio").await.unwrap();

        copy_into_place(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(!dir.path().join("temp_move_song_abc.mp3").exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope.mp4"), dir.path().join("out.mp4")).await;
        assert!(matches!(result, Err(MediaError::Io(_))));
    }
}
