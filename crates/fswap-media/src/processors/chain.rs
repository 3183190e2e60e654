//! Ordered processor chain.

use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use fswap_models::StageName;

use super::{FrameProcessor, ProcessorStage};
use crate::core::StageContext;
use crate::error::{MediaError, MediaResult};
use crate::frames::FrameSet;
use crate::fs_utils::copy_file;

/// Metric name for per-stage wall time, labelled by stage and mode.
pub const STAGE_DURATION_SECONDS: &str = "fswap_stage_duration_seconds";

/// Stages applied in exactly the configured order.
pub struct ProcessorChain {
    stages: Vec<ProcessorStage>,
}

impl ProcessorChain {
    pub fn new(stages: Vec<ProcessorStage>) -> Self {
        Self { stages }
    }

    pub fn names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check every stage's model. Fails with `StageNotReady` on the first miss.
    pub async fn pre_check(&self) -> MediaResult<()> {
        for stage in &self.stages {
            if !stage.pre_check().await? {
                return Err(MediaError::stage_not_ready(stage.name(), "model unavailable"));
            }
        }
        Ok(())
    }

    /// Prepare every stage for the job before any target is touched.
    pub async fn pre_start(&self, ctx: &mut StageContext) -> MediaResult<()> {
        for stage in &self.stages {
            if !stage.pre_start(ctx).await? {
                return Err(MediaError::stage_not_ready(stage.name(), "pre-start check failed"));
            }
        }
        Ok(())
    }

    /// Run the chain once over a whole image, writing `output`.
    ///
    /// The first stage reads `target`; each later stage rewrites `output` in
    /// place. With no stages the target bytes are copied unchanged.
    pub async fn process_image(
        &self,
        ctx: &StageContext,
        target: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        if self.stages.is_empty() {
            return copy_file(target, output).await;
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            let input = if index == 0 { target } else { output };
            let started = Instant::now();

            debug!(stage = %stage.name(), input = %input.display(), "Processing image");
            stage.process_image(ctx, input, output).await?;
            stage.release_resources(ctx).await?;

            record_stage(stage.name(), "image", started);
        }
        Ok(())
    }

    /// Run each stage over the entire frame set before the next stage starts.
    pub async fn process_frames(&self, ctx: &StageContext, frames: &FrameSet) -> MediaResult<()> {
        self.process_frames_with(ctx, frames, |_| {}).await
    }

    /// Like [`process_frames`](Self::process_frames), calling `on_stage`
    /// as each stage begins.
    pub async fn process_frames_with<F>(
        &self,
        ctx: &StageContext,
        frames: &FrameSet,
        mut on_stage: F,
    ) -> MediaResult<()>
    where
        F: FnMut(StageName) + Send,
    {
        for stage in &self.stages {
            if ctx.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            on_stage(stage.name());
            let started = Instant::now();

            info!(stage = %stage.name(), frames = frames.len(), "Processing frames");
            stage.process_frames(ctx, frames.paths()).await?;
            stage.release_resources(ctx).await?;

            record_stage(stage.name(), "frames", started);
        }
        Ok(())
    }
}

fn record_stage(stage: StageName, mode: &'static str, started: Instant) {
    metrics::histogram!(STAGE_DURATION_SECONDS, "stage" => stage.as_str(), "mode" => mode)
        .record(started.elapsed().as_secs_f64());
}
