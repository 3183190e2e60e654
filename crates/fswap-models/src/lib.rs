//! Shared data models for the face-swap pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job options and per-target run state
//! - Processor stage names and execution providers
//! - Face references produced by the detector capability
//! - Encoding defaults for frame reassembly
//! - Progress event wire schema

pub mod encoding;
pub mod face;
pub mod job;
pub mod last_used;
pub mod media;
pub mod progress;
pub mod provider;
pub mod stage;
pub mod target;

// Re-export common types
pub use encoding::EncodingConfig;
pub use face::{primary_face, BoundingBox, FaceRef};
pub use job::{Job, JobAck, JobId, JobOptions, JobState};
pub use last_used::LastUsedPaths;
pub use media::{FrameRate, MediaKind};
pub use progress::{CompleteStatus, FailedTarget, JobEvent, ProgressEvent, TargetStatus};
pub use provider::{
    decode_execution_providers, select_available, suggest_execution_threads, suggest_max_memory,
    ExecutionProvider, ProviderParseError,
};
pub use stage::{StageName, StageParseError};
pub use target::{TargetOutcome, TargetState};
