//! Error types for media and processing operations.

use std::path::PathBuf;
use thiserror::Error;

use fswap_models::StageName;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing, extracting, processing or assembling media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(PathBuf),

    #[error("Frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Frame assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Audio restore failed: {0}")]
    AudioRestoreFailed(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Stage {stage} not ready: {reason}")]
    StageNotReady { stage: StageName, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed(message.into())
    }

    pub fn assembly_failed(message: impl Into<String>) -> Self {
        Self::AssemblyFailed(message.into())
    }

    pub fn audio_restore_failed(message: impl Into<String>) -> Self {
        Self::AudioRestoreFailed(message.into())
    }

    pub fn stage_not_ready(stage: StageName, reason: impl Into<String>) -> Self {
        Self::StageNotReady {
            stage,
            reason: reason.into(),
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Human-readable detail including captured stderr, if any.
    pub fn detail(&self) -> String {
        match self {
            Self::FfmpegFailed {
                message,
                stderr: Some(stderr),
                ..
            }
            | Self::FfprobeFailed {
                message,
                stderr: Some(stderr),
            } if !stderr.trim().is_empty() => format!("{}: {}", message, stderr.trim()),
            other => other.to_string(),
        }
    }
}
