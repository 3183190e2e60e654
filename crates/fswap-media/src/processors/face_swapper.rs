//! Face swap stage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use fswap_models::{FaceRef, StageName};

use super::{pass_through, FrameProcessor};
use crate::core::{detect_all_faces, detect_primary_face, InferenceHandles, StageContext};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{discard_staged, replace_file, staging_path};

/// Replaces faces in the target with the job's source face.
pub struct FaceSwapStage {
    handles: Arc<InferenceHandles>,
}

impl FaceSwapStage {
    pub fn new(handles: Arc<InferenceHandles>) -> Self {
        Self { handles }
    }

    /// Faces to replace in `image`: every face with `many_faces`, else the primary one.
    async fn target_faces(&self, ctx: &StageContext, image: &Path) -> MediaResult<Vec<FaceRef>> {
        let analyser = self.handles.analyser().await?;
        let analyser = analyser.lock().await;
        if ctx.many_faces {
            detect_all_faces(&**analyser, image, &ctx.inference).await
        } else {
            Ok(detect_primary_face(&**analyser, image, &ctx.inference)
                .await?
                .into_iter()
                .collect())
        }
    }

    async fn swap_one(
        &self,
        ctx: &StageContext,
        source: &FaceRef,
        input: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        let faces = self.target_faces(ctx, input).await?;
        if faces.is_empty() {
            debug!(input = %input.display(), "No face detected, passing through");
            return pass_through(input, output).await;
        }

        let staged = staging_path(output);
        let result = {
            let swapper = self.handles.swapper().await?;
            let swapper = swapper.lock().await;
            swapper
                .swap_faces(source, &faces, input, &staged, &ctx.inference)
                .await
        };
        if let Err(e) = result {
            discard_staged(&staged).await;
            return Err(e);
        }
        replace_file(&staged, output).await
    }

    fn source_face<'a>(&self, ctx: &'a StageContext) -> MediaResult<&'a FaceRef> {
        ctx.source_face
            .as_ref()
            .ok_or_else(|| MediaError::stage_not_ready(StageName::FaceSwapper, "source face not detected"))
    }
}

#[async_trait]
impl FrameProcessor for FaceSwapStage {
    fn name(&self) -> StageName {
        StageName::FaceSwapper
    }

    async fn pre_check(&self) -> MediaResult<bool> {
        self.handles.model_available(StageName::FaceSwapper).await
    }

    async fn pre_start(&self, ctx: &mut StageContext) -> MediaResult<bool> {
        if !ctx.source_path.is_file() {
            warn!(source = %ctx.source_path.display(), "Select an image for source path");
            return Ok(false);
        }

        let analyser = self.handles.analyser().await?;
        let face = {
            let analyser = analyser.lock().await;
            detect_primary_face(&**analyser, &ctx.source_path, &ctx.inference).await?
        };

        match face {
            Some(face) => {
                ctx.source_face = Some(face);
                Ok(true)
            }
            None => {
                warn!(source = %ctx.source_path.display(), "No face in source path detected");
                Ok(false)
            }
        }
    }

    async fn process_image(
        &self,
        ctx: &StageContext,
        input: &Path,
        output: &Path,
    ) -> MediaResult<()> {
        let source = self.source_face(ctx)?;
        self.swap_one(ctx, source, input, output).await
    }

    async fn process_frames(&self, ctx: &StageContext, frames: &[PathBuf]) -> MediaResult<()> {
        let source = self.source_face(ctx)?;
        for frame in frames {
            self.swap_one(ctx, source, frame, frame).await?;
        }
        Ok(())
    }

    async fn release_resources(&self, ctx: &StageContext) -> MediaResult<()> {
        self.handles.release(&ctx.inference).await
    }
}
