//! Frame extraction into a scoped workspace.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use fswap_models::encoding::{EncodingConfig, FRAME_EXTENSION, FRAME_PATTERN, FRAME_PIXEL_FORMAT};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Ordered, contiguous sequence of extracted frames (`0001.png`, `0002.png`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    dir: PathBuf,
    frames: Vec<PathBuf>,
}

impl FrameSet {
    /// Scan `dir` for numbered frames.
    ///
    /// Frames are ordered numerically and must run from 1 to N without gaps.
    pub async fn scan(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut numbered: Vec<(u32, PathBuf)> = Vec::new();

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(index) = frame_index(&path) {
                numbered.push((index, path));
            }
        }

        if numbered.is_empty() {
            return Err(MediaError::extraction_failed(format!(
                "no frames found in {}",
                dir.display()
            )));
        }

        numbered.sort_by_key(|(index, _)| *index);
        for (position, (index, path)) in numbered.iter().enumerate() {
            let expected = position as u32 + 1;
            if *index != expected {
                return Err(MediaError::extraction_failed(format!(
                    "frame sequence has a gap: expected {:04}, found {}",
                    expected,
                    path.display()
                )));
            }
        }

        Ok(Self {
            dir,
            frames: numbered.into_iter().map(|(_, path)| path).collect(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// FFmpeg input pattern for this set (`<dir>/%04d.png`).
    pub fn pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }
}

/// Frame number of a `NNNN.png` file, if the name matches.
fn frame_index(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != FRAME_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() < 4 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Demux `video` into RGB frames under `dir`.
///
/// `dir` is created if missing. Fails with `ExtractionFailed` when FFmpeg
/// exits non-zero or produces no frames.
pub async fn extract_frames(
    runner: &FfmpegRunner,
    encoding: &EncodingConfig,
    video: &Path,
    dir: &Path,
) -> MediaResult<FrameSet> {
    fs::create_dir_all(dir).await?;

    let cmd = FfmpegCommand::with_encoding("extract", encoding, dir.join(FRAME_PATTERN))
        .input(video)
        .pixel_format(FRAME_PIXEL_FORMAT);

    info!(video = %video.display(), "Extracting frames");
    runner.run(&cmd).await.map_err(|e| match e {
        MediaError::FfmpegFailed { .. } => MediaError::extraction_failed(e.detail()),
        other => other,
    })?;

    let frames = FrameSet::scan(dir).await?;
    debug!(video = %video.display(), frames = frames.len(), "Frames extracted");
    Ok(frames)
}
