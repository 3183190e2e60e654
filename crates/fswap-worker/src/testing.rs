//! Fake codec for runner and executor tests.
//!
//! Classification goes by extension. Extraction writes `frames` numbered
//! frames (or `n` for a target starting with `frames=<n>;`), and fails when
//! the target starts with `broken`. Assembly writes a
//! small text "video" and records the fps it was asked for.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fswap_media::{FrameSet, MediaError, MediaResult, VideoCodec};
use fswap_models::{FrameRate, MediaKind};

#[derive(Default)]
pub(crate) struct CodecState {
    calls: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct FakeCodec {
    pub frames: usize,
    pub frame_rate: Option<FrameRate>,
    pub audio_fails: bool,
    /// Delay applied inside extraction, to keep a job in flight
    pub extract_delay: Duration,
    pub(crate) state: Arc<CodecState>,
}

impl Default for FakeCodec {
    fn default() -> Self {
        Self {
            frames: 10,
            frame_rate: FrameRate::new(25, 1),
            audio_fails: false,
            extract_delay: Duration::ZERO,
            state: Arc::default(),
        }
    }
}

impl FakeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, call: String) {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

#[async_trait]
impl VideoCodec for FakeCodec {
    async fn classify(&self, path: &Path) -> MediaResult<MediaKind> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(match ext.as_str() {
            "png" | "jpg" | "jpeg" | "webp" => MediaKind::Image,
            "mp4" | "mov" | "mkv" => MediaKind::Video,
            _ => MediaKind::Unknown,
        })
    }

    async fn frame_rate(&self, path: &Path) -> MediaResult<FrameRate> {
        self.frame_rate
            .ok_or_else(|| MediaError::InvalidVideo(format!("no frame rate for {}", path.display())))
    }

    async fn has_audio(&self, _path: &Path) -> MediaResult<bool> {
        Ok(!self.audio_fails)
    }

    async fn extract_frames(&self, video: &Path, dir: &Path) -> MediaResult<FrameSet> {
        if !self.extract_delay.is_zero() {
            tokio::time::sleep(self.extract_delay).await;
        }
        let bytes = tokio::fs::read(video).await?;
        if bytes.starts_with(b"broken") {
            return Err(MediaError::extraction_failed("decoder error"));
        }

        let count = frame_count(&bytes).unwrap_or(self.frames);
        tokio::fs::create_dir_all(dir).await?;
        for i in 1..=count {
            tokio::fs::write(dir.join(format!("{:04}.png", i)), format!("frame{}", i)).await?;
        }
        self.record(format!("extract {}", file_name(video)));
        FrameSet::scan(dir).await
    }

    async fn assemble(&self, frames: &FrameSet, fps: f64, output: &Path) -> MediaResult<()> {
        if frames.is_empty() {
            return Err(MediaError::assembly_failed("no frames"));
        }
        let mut body = String::new();
        for frame in frames.paths() {
            body.push_str(&tokio::fs::read_to_string(frame).await?);
            body.push('\n');
        }
        tokio::fs::write(output, body).await?;
        self.record(format!("assemble frames={} fps={}", frames.len(), fps));
        Ok(())
    }

    async fn restore_audio(&self, original: &Path, video: &Path, output: &Path) -> MediaResult<()> {
        self.record(format!("restore_audio {}", file_name(original)));
        if self.audio_fails {
            return Err(MediaError::audio_restore_failed("no audio stream in original"));
        }
        let mut bytes = tokio::fs::read(video).await?;
        bytes.extend_from_slice(b"+audio");
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

fn frame_count(bytes: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(bytes).ok()?;
    let (count, _) = text.strip_prefix("frames=")?.split_once(';')?;
    count.parse().ok()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Write `content` to `dir/name` and return the path.
pub async fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}
