//! In-process fakes of the inference capabilities.
//!
//! Kernels work on file bytes: the analyser reports no face for files starting
//! with [`NO_FACE`] and two faces for files containing `group`; the swapper and
//! enhancer append `|swap` / `|enhance` to the input bytes, or leave a partial
//! output and fail for inputs starting with [`KERNEL_FAIL`]. Every kernel call
//! is recorded in order.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fswap_models::{BoundingBox, ExecutionProvider, FaceRef, StageName};

use crate::core::{
    FaceAnalyser, FaceEnhancer, FaceSwapper, InferenceHandles, InferenceOptions, ModelLoader,
};
use crate::error::{MediaError, MediaResult};

/// File content the fake analyser treats as face-less.
pub const NO_FACE: &[u8] = b"noface";

/// File content the fake swapper and enhancer fail on.
pub const KERNEL_FAIL: &[u8] = b"kernelfail";

#[derive(Default)]
struct FakeState {
    calls: Mutex<Vec<String>>,
    unavailable: Mutex<HashSet<StageName>>,
    swap_providers: Mutex<Vec<ExecutionProvider>>,
    releases: AtomicUsize,
}

/// Fake model loader and kernels sharing one call log.
#[derive(Clone, Default)]
pub struct FakeInference {
    state: Arc<FakeState>,
}

impl FakeInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the model behind `stage` as missing.
    pub fn with_unavailable(self, stage: StageName) -> Self {
        self.state
            .unavailable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage);
        self
    }

    /// Handles backed by this fake.
    pub fn handles(&self) -> Arc<InferenceHandles> {
        Arc::new(InferenceHandles::new(Arc::new(self.clone())))
    }

    /// Recorded calls, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Providers passed to the most recent swap.
    pub fn swap_providers(&self) -> Vec<ExecutionProvider> {
        self.state
            .swap_providers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn append_marker(input: &Path, output: &Path, marker: &[u8]) -> MediaResult<()> {
    let mut bytes = tokio::fs::read(input).await?;
    if bytes.starts_with(KERNEL_FAIL) {
        tokio::fs::write(output, b"half").await?;
        return Err(MediaError::Inference(format!("kernel failed on {}", file_name(input))));
    }
    bytes.extend_from_slice(marker);
    tokio::fs::write(output, bytes).await?;
    Ok(())
}

#[async_trait]
impl ModelLoader for FakeInference {
    async fn model_available(&self, stage: StageName) -> MediaResult<bool> {
        let unavailable = self.state.unavailable.lock().unwrap_or_else(|e| e.into_inner());
        Ok(!unavailable.contains(&stage))
    }

    async fn load_analyser(&self) -> MediaResult<Box<dyn FaceAnalyser>> {
        self.record("load analyser".to_string());
        Ok(Box::new(FakeAnalyser))
    }

    async fn load_swapper(&self) -> MediaResult<Box<dyn FaceSwapper>> {
        self.record("load swapper".to_string());
        Ok(Box::new(FakeSwapper(self.clone())))
    }

    async fn load_enhancer(&self) -> MediaResult<Box<dyn FaceEnhancer>> {
        self.record("load enhancer".to_string());
        Ok(Box::new(FakeEnhancer(self.clone())))
    }

    async fn release_resources(&self, _opts: &InferenceOptions) -> MediaResult<()> {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        self.record("release".to_string());
        Ok(())
    }
}

struct FakeAnalyser;

#[async_trait]
impl FaceAnalyser for FakeAnalyser {
    async fn detect_faces(&self, image: &Path, _opts: &InferenceOptions) -> MediaResult<Vec<FaceRef>> {
        let bytes = tokio::fs::read(image).await?;
        if bytes.starts_with(NO_FACE) {
            return Ok(Vec::new());
        }
        let mut faces = vec![FaceRef::new(BoundingBox::new(40.0, 10.0, 64.0, 64.0))];
        if bytes.windows(5).any(|w| w == b"group") {
            faces.push(FaceRef::new(BoundingBox::new(200.0, 12.0, 60.0, 60.0)));
        }
        Ok(faces)
    }
}

struct FakeSwapper(FakeInference);

#[async_trait]
impl FaceSwapper for FakeSwapper {
    async fn swap_faces(
        &self,
        _source: &FaceRef,
        targets: &[FaceRef],
        input: &Path,
        output: &Path,
        opts: &InferenceOptions,
    ) -> MediaResult<()> {
        self.0
            .record(format!("swap {} faces={}", file_name(input), targets.len()));
        *self
            .0
            .state
            .swap_providers
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = opts.execution_providers.clone();
        append_marker(input, output, b"|swap").await
    }
}

struct FakeEnhancer(FakeInference);

#[async_trait]
impl FaceEnhancer for FakeEnhancer {
    async fn enhance_faces(
        &self,
        faces: &[FaceRef],
        input: &Path,
        output: &Path,
        _opts: &InferenceOptions,
    ) -> MediaResult<()> {
        self.0
            .record(format!("enhance {} faces={}", file_name(input), faces.len()));
        append_marker(input, output, b"|enhance").await
    }
}
