//! Processor stage names.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Available frame processor stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Replace faces in the target with the source face
    FaceSwapper,
    /// Restore/upscale faces in the target
    FaceEnhancer,
}

impl StageName {
    pub const ALL: &'static [StageName] = &[StageName::FaceSwapper, StageName::FaceEnhancer];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::FaceSwapper => "face_swapper",
            StageName::FaceEnhancer => "face_enhancer",
        }
    }

    /// Parse a configured stage list, preserving order. Unknown names are errors.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<StageName>, StageParseError> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageName {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "face_swapper" => Ok(StageName::FaceSwapper),
            "face_enhancer" => Ok(StageName::FaceEnhancer),
            _ => Err(StageParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown frame processor: {0}")]
pub struct StageParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_names() {
        for stage in StageName::ALL {
            assert_eq!(stage.as_str().parse::<StageName>().unwrap(), *stage);
        }
    }

    #[test]
    fn test_parse_list_preserves_order() {
        let stages = StageName::parse_list(&["face_enhancer", "face_swapper"]).unwrap();
        assert_eq!(stages, vec![StageName::FaceEnhancer, StageName::FaceSwapper]);
    }

    #[test]
    fn test_parse_list_rejects_unknown() {
        let err = StageName::parse_list(&["face_swapper", "lip_syncer"]).unwrap_err();
        assert_eq!(err, StageParseError("lip_syncer".to_string()));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&StageName::FaceEnhancer).unwrap();
        assert_eq!(json, "\"face_enhancer\"");
    }
}
