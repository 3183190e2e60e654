//! Codec seam used by the job runner.

use async_trait::async_trait;
use std::path::Path;

use fswap_models::{EncodingConfig, FrameRate, MediaKind};

use crate::assemble::{assemble_frames, restore_audio};
use crate::command::{check_ffmpeg, check_ffprobe, FfmpegRunner};
use crate::error::MediaResult;
use crate::frames::{extract_frames, FrameSet};
use crate::probe;

/// Media operations the runner needs from the external codec tool.
#[async_trait]
pub trait VideoCodec: Send + Sync {
    /// Classify a target by content.
    async fn classify(&self, path: &Path) -> MediaResult<MediaKind>;

    /// Frame rate of the first video stream.
    async fn frame_rate(&self, path: &Path) -> MediaResult<FrameRate>;

    /// Whether the file carries an audio stream.
    async fn has_audio(&self, _path: &Path) -> MediaResult<bool> {
        Ok(true)
    }

    /// Demux `video` into numbered frames under `dir`.
    async fn extract_frames(&self, video: &Path, dir: &Path) -> MediaResult<FrameSet>;

    /// Re-encode `frames` at `fps` into `output`.
    async fn assemble(&self, frames: &FrameSet, fps: f64, output: &Path) -> MediaResult<()>;

    /// Remux the audio of `original` onto `video`, writing `output`.
    async fn restore_audio(&self, original: &Path, video: &Path, output: &Path)
        -> MediaResult<()>;
}

/// `VideoCodec` backed by the FFmpeg and FFprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCodec {
    encoding: EncodingConfig,
    runner: FfmpegRunner,
}

impl FfmpegCodec {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            runner: FfmpegRunner::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Verify both binaries are on PATH.
    pub fn check_available() -> MediaResult<()> {
        check_ffmpeg()?;
        check_ffprobe()?;
        Ok(())
    }
}

#[async_trait]
impl VideoCodec for FfmpegCodec {
    async fn classify(&self, path: &Path) -> MediaResult<MediaKind> {
        probe::classify(path).await
    }

    async fn frame_rate(&self, path: &Path) -> MediaResult<FrameRate> {
        probe::frame_rate(path).await
    }

    async fn has_audio(&self, path: &Path) -> MediaResult<bool> {
        Ok(probe::probe_video(path).await?.has_audio)
    }

    async fn extract_frames(&self, video: &Path, dir: &Path) -> MediaResult<FrameSet> {
        extract_frames(&self.runner, &self.encoding, video, dir).await
    }

    async fn assemble(&self, frames: &FrameSet, fps: f64, output: &Path) -> MediaResult<()> {
        assemble_frames(&self.runner, &self.encoding, frames, fps, output).await
    }

    async fn restore_audio(
        &self,
        original: &Path,
        video: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        restore_audio(&self.runner, &self.encoding, original, video, output).await
    }
}
