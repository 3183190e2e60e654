//! Per-target run state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of one target inside a job.
///
/// ```text
/// Pending -> Classifying -> ImagePath ---------------------------> Processing -> Finalizing -> Done
///                        -> VideoPath -> Processing -> Assembling -> [AudioRestoring] -> Finalizing -> Done
/// any state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    #[default]
    Pending,
    Classifying,
    ImagePath,
    VideoPath,
    Processing,
    Assembling,
    AudioRestoring,
    Finalizing,
    Done,
    Failed,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Pending => "pending",
            TargetState::Classifying => "classifying",
            TargetState::ImagePath => "image_path",
            TargetState::VideoPath => "video_path",
            TargetState::Processing => "processing",
            TargetState::Assembling => "assembling",
            TargetState::AudioRestoring => "audio_restoring",
            TargetState::Finalizing => "finalizing",
            TargetState::Done => "done",
            TargetState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Done | TargetState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: TargetState) -> bool {
        use TargetState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Classifying)
                | (Classifying, ImagePath)
                | (Classifying, VideoPath)
                | (ImagePath, Processing)
                | (VideoPath, Processing)
                | (Processing, Assembling)
                | (Processing, Finalizing)
                | (Assembling, AudioRestoring)
                | (Assembling, Finalizing)
                | (AudioRestoring, Finalizing)
                | (Finalizing, Done)
        )
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal result of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TargetOutcome {
    Done {
        target: PathBuf,
        output: PathBuf,
        /// Non-fatal problems (e.g. audio could not be restored)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Failed {
        target: PathBuf,
        /// Error kind (`unsupported_media`, `extraction_failed`, ...)
        kind: String,
        error: String,
    },
}

impl TargetOutcome {
    pub fn target(&self) -> &PathBuf {
        match self {
            TargetOutcome::Done { target, .. } | TargetOutcome::Failed { target, .. } => target,
        }
    }

    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            TargetOutcome::Done { output, .. } => Some(output),
            TargetOutcome::Failed { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TargetOutcome::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_path_transitions() {
        let path = [
            TargetState::Pending,
            TargetState::Classifying,
            TargetState::ImagePath,
            TargetState::Processing,
            TargetState::Finalizing,
            TargetState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_video_path_transitions() {
        let path = [
            TargetState::Classifying,
            TargetState::VideoPath,
            TargetState::Processing,
            TargetState::Assembling,
            TargetState::AudioRestoring,
            TargetState::Finalizing,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
        assert!(TargetState::Assembling.can_transition_to(TargetState::Finalizing));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!TargetState::Pending.can_transition_to(TargetState::Processing));
        assert!(!TargetState::ImagePath.can_transition_to(TargetState::Assembling));
        assert!(!TargetState::Done.can_transition_to(TargetState::Failed));
        assert!(TargetState::Processing.can_transition_to(TargetState::Failed));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = TargetOutcome::Failed {
            target: PathBuf::from("a.mp4"),
            kind: "extraction_failed".to_string(),
            error: "no frames".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["kind"], "extraction_failed");
        assert!(outcome.output().is_none());
    }
}
