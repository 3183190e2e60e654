//! Job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::provider::{suggest_execution_threads, suggest_max_memory, ExecutionProvider};
use crate::stage::StageName;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, used to disambiguate output file names.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for a worker slot
    #[default]
    Pending,
    /// Targets are being processed
    Running,
    /// Every target reached a terminal state
    Completed,
    /// Stopped by a cancellation signal
    Cancelled,
    /// Aborted before or between targets (stage not ready, rejected content)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_stages() -> Vec<StageName> {
    vec![StageName::FaceSwapper]
}

fn default_true() -> bool {
    true
}

fn default_providers() -> Vec<ExecutionProvider> {
    vec![ExecutionProvider::Cpu]
}

fn default_max_memory() -> u32 {
    suggest_max_memory()
}

fn default_execution_threads() -> u32 {
    suggest_execution_threads(&default_providers())
}

/// Per-job options. Travels with the job; nothing here is process-wide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    /// Ordered processor stages
    #[serde(default = "default_stages")]
    pub stages: Vec<StageName>,

    /// Swap every detected face instead of the primary one
    #[serde(default)]
    pub many_faces: bool,

    /// Reassemble at the detected frame rate instead of 30 fps
    #[serde(default)]
    pub keep_fps: bool,

    /// Remux the original audio onto the output video
    #[serde(default = "default_true")]
    pub keep_audio: bool,

    /// Keep the temp workspace after a target finishes
    #[serde(default)]
    pub keep_frames: bool,

    /// Memory limit for the inference backend, in GB
    #[serde(default = "default_max_memory")]
    pub max_memory: u32,

    /// Inference thread count
    #[serde(default = "default_execution_threads")]
    pub execution_threads: u32,

    /// Execution provider preference, in order
    #[serde(default = "default_providers")]
    pub execution_providers: Vec<ExecutionProvider>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            many_faces: false,
            keep_fps: false,
            keep_audio: true,
            keep_frames: false,
            max_memory: default_max_memory(),
            execution_threads: default_execution_threads(),
            execution_providers: default_providers(),
        }
    }
}

impl JobOptions {
    /// Whether the job uses an accelerator that needs explicit memory release.
    pub fn needs_release(&self) -> bool {
        self.execution_providers.iter().any(|p| p.needs_release())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("At least one frame processor is required".to_string());
        }
        if self.execution_threads == 0 {
            return Err("execution_threads must be at least 1".to_string());
        }
        if self.max_memory == 0 {
            return Err("max_memory must be at least 1 GB".to_string());
        }
        if self.execution_providers.is_empty() {
            return Err("At least one execution provider is required".to_string());
        }
        Ok(())
    }
}

/// A face swap job: one source face applied to an ordered list of targets.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    /// Image holding the face to apply
    pub source_path: PathBuf,

    /// Targets, processed strictly in this order
    pub target_paths: Vec<PathBuf>,

    pub output_dir: PathBuf,

    #[serde(default)]
    pub options: JobOptions,

    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        source_path: impl Into<PathBuf>,
        target_paths: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: JobId::new(),
            source_path: source_path.into(),
            target_paths,
            output_dir: output_dir.into(),
            options: JobOptions::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_path.as_os_str().is_empty() {
            return Err("A source file is required".to_string());
        }
        if self.target_paths.is_empty() {
            return Err("At least one target file is required".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("An output directory is required".to_string());
        }
        self.options.validate()
    }
}

/// Immediate acknowledgment returned on submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobAck {
    pub status: String,
    pub job_id: JobId,
    pub output_dir: PathBuf,
}

impl JobAck {
    pub fn started(job: &Job) -> Self {
        Self {
            status: "Processing started".to_string(),
            job_id: job.id.clone(),
            output_dir: job.output_dir.clone(),
        }
    }
}
