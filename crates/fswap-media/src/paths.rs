//! Output naming and temp workspace layout.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs;
use tracing::{debug, warn};

use fswap_models::encoding::TEMP_VIDEO_NAME;
use fswap_models::{JobId, MediaKind};

use crate::error::{MediaError, MediaResult};

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string())
}

/// Computes output paths and temp workspaces.
///
/// Clones share the claim set, so concurrent jobs using one policy never
/// receive the same output path.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    work_dir: PathBuf,
    claims: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathPolicy {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `<source_stem>-<target_stem>.<ext>`
    pub fn output_name(source: &Path, target: &Path, kind: MediaKind) -> MediaResult<String> {
        let ext = kind
            .output_extension()
            .ok_or_else(|| MediaError::UnsupportedMedia(target.to_path_buf()))?;
        Ok(format!("{}-{}.{}", stem_of(source), stem_of(target), ext))
    }

    /// Claim a unique output path for one target.
    ///
    /// If the plain name exists on disk or is claimed by an in-flight target,
    /// the job id prefix is appended, then a counter. The claim is released
    /// when the returned guard drops.
    pub fn claim_output(
        &self,
        job_id: &JobId,
        source: &Path,
        target: &Path,
        kind: MediaKind,
        output_dir: &Path,
    ) -> MediaResult<OutputClaim> {
        let ext = kind
            .output_extension()
            .ok_or_else(|| MediaError::UnsupportedMedia(target.to_path_buf()))?;
        let base = format!("{}-{}", stem_of(source), stem_of(target));

        let mut claims = self.lock_claims();

        let mut candidate = output_dir.join(format!("{}.{}", base, ext));
        if is_taken(&candidate, &claims) {
            let tagged = format!("{}-{}", base, job_id.short());
            candidate = output_dir.join(format!("{}.{}", tagged, ext));
            let mut counter = 1u32;
            while is_taken(&candidate, &claims) {
                candidate = output_dir.join(format!("{}-{}.{}", tagged, counter, ext));
                counter += 1;
            }
            debug!(job_id = %job_id, path = %candidate.display(), "Output name collided, disambiguated");
        }

        claims.insert(candidate.clone());
        Ok(OutputClaim {
            path: candidate,
            claims: Arc::clone(&self.claims),
        })
    }

    /// Temp workspace for one target: `<work_dir>/<job_id>/<n>-<target_stem>/`,
    /// `n` being the target's 1-based position in the job. Targets sharing a
    /// stem (`a/clip.mp4`, `b/clip.mp4`) get separate directories.
    pub fn workspace(&self, job_id: &JobId, index: usize, target: &Path) -> TempWorkspace {
        let job_dir = self.work_dir.join(job_id.as_str());
        let dir = job_dir.join(format!("{}-{}", index + 1, stem_of(target)));
        TempWorkspace { job_dir, dir }
    }

    /// Number of output paths currently claimed.
    pub fn claimed(&self) -> usize {
        self.lock_claims().len()
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An output path reserved for one target. Dropping releases the reservation.
#[derive(Debug)]
pub struct OutputClaim {
    path: PathBuf,
    claims: Arc<Mutex<HashSet<PathBuf>>>,
}

impl OutputClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputClaim {
    fn drop(&mut self) {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claims.remove(&self.path);
    }
}

/// Per-target scratch directory holding frames and the assembled video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempWorkspace {
    job_dir: PathBuf,
    dir: PathBuf,
}

impl TempWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where frames are extracted.
    pub fn frames_dir(&self) -> &Path {
        &self.dir
    }

    /// Assembled video before audio restoration.
    pub fn temp_video(&self) -> PathBuf {
        self.dir.join(TEMP_VIDEO_NAME)
    }

    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    /// Create the workspace. Safe to call when it already exists.
    pub async fn create(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Remove the target directory, then the job directory if it is now empty.
    pub async fn clean(&self) -> MediaResult<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).await?;
        }
        if self.job_dir.exists() && is_empty_dir(&self.job_dir).await? {
            if let Err(e) = fs::remove_dir(&self.job_dir).await {
                // another target of the same job may have raced a file in
                warn!(dir = %self.job_dir.display(), "Failed to remove job workspace: {}", e);
            }
        }
        Ok(())
    }
}

fn is_taken(path: &Path, claims: &HashSet<PathBuf>) -> bool {
    path.exists() || claims.contains(path)
}

async fn is_empty_dir(dir: &Path) -> MediaResult<bool> {
    let mut entries = fs::read_dir(dir).await?;
    Ok(entries.next_entry().await?.is_none())
}
