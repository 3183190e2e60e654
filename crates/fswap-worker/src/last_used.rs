//! Last-used source/target pair, persisted as a small JSON file.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use fswap_media::fs_utils::{ensure_parent, replace_file, staging_path};
use fswap_models::LastUsedPaths;

use crate::error::WorkerResult;

#[derive(Debug, Clone)]
pub struct LastUsedStore {
    path: PathBuf,
}

impl LastUsedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored pair, or an empty record when nothing has been saved yet.
    pub async fn load(&self) -> WorkerResult<LastUsedPaths> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LastUsedPaths::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored pair.
    pub async fn save(&self, paths: &LastUsedPaths) -> WorkerResult<()> {
        ensure_parent(&self.path).await?;
        let staged = staging_path(&self.path);
        fs::write(&staged, serde_json::to_vec_pretty(paths)?).await?;
        replace_file(&staged, &self.path).await?;
        debug!(path = %self.path.display(), "Saved last-used paths");
        Ok(())
    }
}
