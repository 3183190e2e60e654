//! Face enhancement stage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use fswap_models::StageName;

use super::{pass_through, FrameProcessor};
use crate::core::{detect_all_faces, InferenceHandles, StageContext};
use crate::error::MediaResult;
use crate::fs_utils::{discard_staged, replace_file, staging_path};

/// Restores every detected face.
pub struct FaceEnhanceStage {
    handles: Arc<InferenceHandles>,
}

impl FaceEnhanceStage {
    pub fn new(handles: Arc<InferenceHandles>) -> Self {
        Self { handles }
    }

    async fn enhance_one(&self, ctx: &StageContext, input: &Path, output: &Path) -> MediaResult<()> {
        let faces = {
            let analyser = self.handles.analyser().await?;
            let analyser = analyser.lock().await;
            detect_all_faces(&**analyser, input, &ctx.inference).await?
        };
        if faces.is_empty() {
            debug!(input = %input.display(), "No face detected, passing through");
            return pass_through(input, output).await;
        }

        let staged = staging_path(output);
        let result = {
            let enhancer = self.handles.enhancer().await?;
            let enhancer = enhancer.lock().await;
            enhancer
                .enhance_faces(&faces, input, &staged, &ctx.inference)
                .await
        };
        if let Err(e) = result {
            discard_staged(&staged).await;
            return Err(e);
        }
        replace_file(&staged, output).await
    }
}

#[async_trait]
impl FrameProcessor for FaceEnhanceStage {
    fn name(&self) -> StageName {
        StageName::FaceEnhancer
    }

    async fn pre_check(&self) -> MediaResult<bool> {
        self.handles.model_available(StageName::FaceEnhancer).await
    }

    async fn pre_start(&self, _ctx: &mut StageContext) -> MediaResult<bool> {
        Ok(true)
    }

    async fn process_image(
        &self,
        ctx: &StageContext,
        input: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        self.enhance_one(ctx, input, output).await
    }

    async fn process_frames(&self, ctx: &StageContext, frames: &[PathBuf]) -> MediaResult<()> {
        for frame in frames {
            self.enhance_one(ctx, frame, frame).await?;
        }
        Ok(())
    }

    async fn release_resources(&self, ctx: &StageContext) -> MediaResult<()> {
        self.handles.release(&ctx.inference).await
    }
}
