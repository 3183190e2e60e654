//! Worker error types.

use std::path::PathBuf;
use thiserror::Error;

use fswap_media::MediaError;
use fswap_progress::ProgressError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported media: {}", .0.display())]
    UnsupportedMedia(PathBuf),

    #[error("Frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Frame assembly failed: {0}")]
    AssemblyFailed(String),

    #[error("Audio restore failed: {0}")]
    AudioRestoreFailed(String),

    #[error("Stage not ready: {0}")]
    StageNotReady(String),

    #[error("Content rejected by safety check: {}", .0.display())]
    ContentRejected(PathBuf),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MediaError> for WorkerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::UnsupportedMedia(path) => Self::UnsupportedMedia(path),
            MediaError::ExtractionFailed(msg) => Self::ExtractionFailed(msg),
            MediaError::AssemblyFailed(msg) => Self::AssemblyFailed(msg),
            MediaError::AudioRestoreFailed(msg) => Self::AudioRestoreFailed(msg),
            MediaError::Configuration(msg) => Self::Configuration(msg),
            err @ MediaError::StageNotReady { .. } => Self::StageNotReady(err.to_string()),
            MediaError::Cancelled => Self::Cancelled,
            other => Self::Media(other),
        }
    }
}

impl WorkerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Short label used in failure markers and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Configuration(_) => "configuration",
            WorkerError::UnsupportedMedia(_) => "unsupported_media",
            WorkerError::ExtractionFailed(_) => "extraction_failed",
            WorkerError::AssemblyFailed(_) => "assembly_failed",
            WorkerError::AudioRestoreFailed(_) => "audio_restore_failed",
            WorkerError::StageNotReady(_) => "stage_not_ready",
            WorkerError::ContentRejected(_) => "content_rejected",
            WorkerError::Cancelled => "cancelled",
            WorkerError::Media(_) => "processing_failed",
            WorkerError::Progress(_) => "progress",
            WorkerError::Io(_) => "io",
            WorkerError::Json(_) => "json",
        }
    }

    /// Fails the current target only; the job moves on to the next one.
    pub fn is_target_scoped(&self) -> bool {
        matches!(
            self,
            WorkerError::UnsupportedMedia(_)
                | WorkerError::ExtractionFailed(_)
                | WorkerError::AssemblyFailed(_)
                | WorkerError::Media(_)
                | WorkerError::Io(_)
                | WorkerError::Json(_)
        )
    }

    /// Aborts the whole job.
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Configuration(_)
                | WorkerError::StageNotReady(_)
                | WorkerError::ContentRejected(_)
                | WorkerError::Cancelled
                | WorkerError::Progress(_)
        )
    }
}
