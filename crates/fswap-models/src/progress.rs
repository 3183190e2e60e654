//! Progress stream records.
//!
//! The wire format is untagged so each record serializes to the plain shapes
//! consumers expect: `{"progress": 50.0}`, `{"message": "..."}`,
//! `{"status": "complete", "output_files": [...]}`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::JobId;

/// Marker for the job completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompleteStatus {
    #[default]
    Complete,
}

/// Terminal status of a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Done,
    Failed,
}

/// A target that did not produce an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FailedTarget {
    pub target: PathBuf,
    pub error: String,
}

/// One record on the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// Job progress, 0-100
    Progress { progress: f64 },

    /// Human-readable status or error text
    Message { message: String },

    /// Job finished; one entry per target that reached finalization
    Complete {
        status: CompleteStatus,
        output_files: Vec<PathBuf>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_targets: Vec<FailedTarget>,
    },

    /// Per-target terminal marker
    Target {
        status: TargetStatus,
        target: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ProgressEvent {
    pub fn progress(value: f64) -> Self {
        ProgressEvent::Progress {
            progress: value.clamp(0.0, 100.0),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        ProgressEvent::Message {
            message: text.into(),
        }
    }

    pub fn complete(output_files: Vec<PathBuf>, failed_targets: Vec<FailedTarget>) -> Self {
        ProgressEvent::Complete {
            status: CompleteStatus::Complete,
            output_files,
            failed_targets,
        }
    }

    pub fn target_done(target: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        ProgressEvent::Target {
            status: TargetStatus::Done,
            target: target.into(),
            output_file: Some(output.into()),
            error: None,
        }
    }

    pub fn target_failed(target: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        ProgressEvent::Target {
            status: TargetStatus::Failed,
            target: target.into(),
            output_file: None,
            error: Some(error.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. })
    }
}

/// Progress record tagged with the job it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

impl JobEvent {
    pub fn new(job_id: JobId, event: ProgressEvent) -> Self {
        Self { job_id, event }
    }
}
