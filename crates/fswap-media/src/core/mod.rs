//! Capability interfaces for the external inference collaborators.
//!
//! Face detection, swapping, enhancement and content classification are
//! supplied by pluggable implementations (see `fswap-ml-client`). Stages only
//! see these traits, injected through [`InferenceHandles`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use fswap_models::{primary_face, ExecutionProvider, FaceRef, JobId, JobOptions, StageName};

use crate::error::MediaResult;

pub mod handles;

pub use handles::{InferenceHandle, InferenceHandles};

/// Job-local inference settings sent with every inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceOptions {
    pub execution_providers: Vec<ExecutionProvider>,
    pub execution_threads: u32,
    /// GB
    pub max_memory: u32,
}

impl InferenceOptions {
    pub fn from_job(options: &JobOptions) -> Self {
        Self {
            execution_providers: options.execution_providers.clone(),
            execution_threads: options.execution_threads,
            max_memory: options.max_memory,
        }
    }

    /// Whether transient accelerator memory must be released between stages.
    pub fn needs_release(&self) -> bool {
        self.execution_providers.iter().any(|p| p.needs_release())
    }
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self::from_job(&JobOptions::default())
    }
}

/// Face detection capability.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait FaceAnalyser: Send + Sync {
    /// All faces in the image, in detector order.
    async fn detect_faces(&self, image: &Path, opts: &InferenceOptions) -> MediaResult<Vec<FaceRef>>;
}

/// Primary face of an image: leftmost bounding box, first on ties.
pub async fn detect_primary_face(
    analyser: &dyn FaceAnalyser,
    image: &Path,
    opts: &InferenceOptions,
) -> MediaResult<Option<FaceRef>> {
    let faces = analyser.detect_faces(image, opts).await?;
    Ok(primary_face(&faces).cloned())
}

/// Every face of an image, in detector order.
pub async fn detect_all_faces(
    analyser: &dyn FaceAnalyser,
    image: &Path,
    opts: &InferenceOptions,
) -> MediaResult<Vec<FaceRef>> {
    analyser.detect_faces(image, opts).await
}

/// Face swap inference kernel.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait FaceSwapper: Send + Sync {
    /// Paste `source` over each of `targets` found in `input`, writing `output`.
    async fn swap_faces(
        &self,
        source: &FaceRef,
        targets: &[FaceRef],
        input: &Path,
        output: &Path,
        opts: &InferenceOptions,
    ) -> MediaResult<()>;
}

/// Face restoration inference kernel.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait FaceEnhancer: Send + Sync {
    /// Restore `faces` found in `input`, writing `output`.
    async fn enhance_faces(
        &self,
        faces: &[FaceRef],
        input: &Path,
        output: &Path,
        opts: &InferenceOptions,
    ) -> MediaResult<()>;
}

/// Content safety classifier.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ContentSafetyClassifier: Send + Sync {
    async fn is_unsafe(&self, path: &Path) -> MediaResult<bool>;
}

/// Loads inference kernels and manages accelerator resources.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Whether the model behind `stage` is present and loadable.
    async fn model_available(&self, stage: StageName) -> MediaResult<bool>;

    async fn load_analyser(&self) -> MediaResult<Box<dyn FaceAnalyser>>;

    async fn load_swapper(&self) -> MediaResult<Box<dyn FaceSwapper>>;

    async fn load_enhancer(&self) -> MediaResult<Box<dyn FaceEnhancer>>;

    /// Free transient accelerator memory.
    async fn release_resources(&self, opts: &InferenceOptions) -> MediaResult<()>;
}

/// Per-job state threaded through every stage call.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: JobId,
    pub source_path: PathBuf,
    pub many_faces: bool,
    pub inference: InferenceOptions,
    /// Set by the swap stage's `pre_start`
    pub source_face: Option<FaceRef>,
    cancel: Option<watch::Receiver<bool>>,
}

impl StageContext {
    pub fn new(job_id: JobId, source_path: impl Into<PathBuf>, options: &JobOptions) -> Self {
        Self {
            job_id,
            source_path: source_path.into(),
            many_faces: options.many_faces,
            inference: InferenceOptions::from_job(options),
            source_face: None,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}
