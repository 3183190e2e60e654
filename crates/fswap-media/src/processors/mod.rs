//! Frame processor stages.
//!
//! Each stage implements [`FrameProcessor`]. The set of stages is closed:
//! [`ProcessorStage`] wraps every variant and [`StageRegistry`] maps a
//! configured [`StageName`] to its implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fswap_models::StageName;

use crate::core::{InferenceHandles, StageContext};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::copy_file;

pub mod chain;
pub mod face_enhancer;
pub mod face_swapper;

pub use chain::ProcessorChain;
pub use face_enhancer::FaceEnhanceStage;
pub use face_swapper::FaceSwapStage;

/// Capability set every stage provides.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    fn name(&self) -> StageName;

    /// Whether the stage's model is available.
    async fn pre_check(&self) -> MediaResult<bool>;

    /// Per-job readiness. Runs before any target is touched.
    async fn pre_start(&self, ctx: &mut StageContext) -> MediaResult<bool>;

    /// Transform one image. `output` may equal `input`.
    async fn process_image(&self, ctx: &StageContext, input: &Path, output: &Path)
        -> MediaResult<()>;

    /// Transform every frame in place, in order.
    async fn process_frames(&self, ctx: &StageContext, frames: &[PathBuf]) -> MediaResult<()>;

    /// Free per-stage transient resources.
    async fn release_resources(&self, ctx: &StageContext) -> MediaResult<()>;
}

/// Closed set of stage variants.
pub enum ProcessorStage {
    FaceSwapper(FaceSwapStage),
    FaceEnhancer(FaceEnhanceStage),
}

impl ProcessorStage {
    fn inner(&self) -> &dyn FrameProcessor {
        match self {
            ProcessorStage::FaceSwapper(stage) => stage,
            ProcessorStage::FaceEnhancer(stage) => stage,
        }
    }
}

#[async_trait]
impl FrameProcessor for ProcessorStage {
    fn name(&self) -> StageName {
        self.inner().name()
    }

    async fn pre_check(&self) -> MediaResult<bool> {
        self.inner().pre_check().await
    }

    async fn pre_start(&self, ctx: &mut StageContext) -> MediaResult<bool> {
        self.inner().pre_start(ctx).await
    }

    async fn process_image(
        &self,
        ctx: &StageContext,
        input: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        self.inner().process_image(ctx, input, output).await
    }

    async fn process_frames(&self, ctx: &StageContext, frames: &[PathBuf]) -> MediaResult<()> {
        self.inner().process_frames(ctx, frames).await
    }

    async fn release_resources(&self, ctx: &StageContext) -> MediaResult<()> {
        self.inner().release_resources(ctx).await
    }
}

/// Static registry from stage name to implementation.
pub struct StageRegistry;

impl StageRegistry {
    pub fn create(name: StageName, handles: Arc<InferenceHandles>) -> ProcessorStage {
        match name {
            StageName::FaceSwapper => ProcessorStage::FaceSwapper(FaceSwapStage::new(handles)),
            StageName::FaceEnhancer => ProcessorStage::FaceEnhancer(FaceEnhanceStage::new(handles)),
        }
    }

    /// Build a chain in the configured order.
    pub fn build(names: &[StageName], handles: Arc<InferenceHandles>) -> ProcessorChain {
        ProcessorChain::new(
            names
                .iter()
                .map(|name| Self::create(*name, Arc::clone(&handles)))
                .collect(),
        )
    }

    /// Build a chain from raw names; an unknown name is a configuration error.
    pub fn build_from_names<S: AsRef<str>>(
        names: &[S],
        handles: Arc<InferenceHandles>,
    ) -> MediaResult<ProcessorChain> {
        let names = StageName::parse_list(names).map_err(|e| MediaError::configuration(e.to_string()))?;
        Ok(Self::build(&names, handles))
    }
}

/// Leave the image unchanged: copy it when writing elsewhere.
pub(crate) async fn pass_through(input: &Path, output: &Path) -> MediaResult<()> {
    if input != output {
        copy_file(input, output).await?;
    }
    Ok(())
}
