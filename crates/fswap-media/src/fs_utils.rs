//! Filesystem helpers: cross-device moves and in-place replacement.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Tries a rename first and falls back to copy-then-delete on EXDEV. The
/// fallback copies to a sibling of `dst` and renames it into place, so `dst`
/// never holds a partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Copy `src` to `dst` through a sibling staging file.
pub async fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    ensure_parent(dst).await?;

    let staging = staging_path(dst);
    fs::copy(src, &staging).await?;
    replace_file(&staging, dst).await
}

/// Sibling path used to stage a write to `path`.
///
/// Keeps the extension so encoders still infer the format from it:
/// `frames/0001.png` -> `frames/.0001.partial.png`.
pub fn staging_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!(".{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!(".{}.partial", stem),
    };
    path.with_file_name(name)
}

/// Atomically replace `dst` with the staged file.
///
/// The staged file is removed when the rename fails.
pub async fn replace_file(staged: &Path, dst: &Path) -> MediaResult<()> {
    if let Err(e) = fs::rename(staged, dst).await {
        let _ = fs::remove_file(staged).await;
        return Err(MediaError::from(e));
    }
    Ok(())
}

/// Remove a staged file left by a failed write, if any.
pub async fn discard_staged(staged: &Path) {
    if let Err(e) = fs::remove_file(staged).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove staged file {}: {}", staged.display(), e);
        }
    }
}

/// Create the parent directory of `path` if missing.
pub async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// EXDEV is error code 18 on Linux/macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = staging_path(dst);

    fs::copy(src, &staging).await.map_err(|e| {
        tracing::error!(
            "Failed to copy during cross-device move: {} -> {}: {}",
            src.display(),
            staging.display(),
            e
        );
        MediaError::from(e)
    })?;

    replace_file(&staging, dst).await?;

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("temp.mp4");
        let dst = dir.path().join("Output").join("face-clip.mp4");

        fs::write(&src, b"video").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_copy_file_keeps_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("target.png");
        let dst = dir.path().join("out").join("face-target.png");

        fs::write(&src, b"pixels").await.unwrap();
        copy_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&src).await.unwrap(), b"pixels");
        assert_eq!(fs::read(&dst).await.unwrap(), b"pixels");
        assert!(!staging_path(&dst).exists());
    }

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/tmp/frames/0001.png")),
            PathBuf::from("/tmp/frames/.0001.partial.png")
        );
        assert_eq!(
            staging_path(Path::new("out/result")),
            PathBuf::from("out/.result.partial")
        );
    }

    #[tokio::test]
    async fn test_replace_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("0001.png");
        let staged = staging_path(&dst);

        fs::write(&dst, b"old").await.unwrap();
        fs::write(&staged, b"new").await.unwrap();
        replace_file(&staged, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
        assert!(!staged.exists());
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
