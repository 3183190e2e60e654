//! Last-used source/target pair, remembered for front-end convenience.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct LastUsedPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
}

impl LastUsedPaths {
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(source_path.into()),
            target_path: Some(target_path.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source_path.is_none() && self.target_path.is_none()
    }
}
