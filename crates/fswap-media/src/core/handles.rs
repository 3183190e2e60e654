//! Process-wide inference handles.
//!
//! Each handle is built on first use and reused by every job afterwards.
//! Calls through a handle are serialized by its mutex since the kernels are
//! not guaranteed to be safe for concurrent use.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use fswap_models::StageName;

use super::{FaceAnalyser, FaceEnhancer, FaceSwapper, InferenceOptions, ModelLoader};
use crate::error::MediaResult;

/// Shared, lazily-initialized inference kernel.
pub struct InferenceHandle<T: ?Sized> {
    cell: OnceCell<Arc<Mutex<Box<T>>>>,
}

impl<T: ?Sized> Default for InferenceHandle<T> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T: ?Sized + Send> InferenceHandle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle, building it with `init` on first access.
    ///
    /// Concurrent first callers wait for a single initialization. A failed
    /// initialization leaves the handle empty so a later call can retry.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> MediaResult<Arc<Mutex<Box<T>>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MediaResult<Box<T>>>,
    {
        let handle = self
            .cell
            .get_or_try_init(move || async move {
                init().await.map(|kernel| Arc::new(Mutex::new(kernel)))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

/// The set of inference handles injected into processor stages.
pub struct InferenceHandles {
    loader: Arc<dyn ModelLoader>,
    analyser: InferenceHandle<dyn FaceAnalyser>,
    swapper: InferenceHandle<dyn FaceSwapper>,
    enhancer: InferenceHandle<dyn FaceEnhancer>,
}

impl InferenceHandles {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            analyser: InferenceHandle::new(),
            swapper: InferenceHandle::new(),
            enhancer: InferenceHandle::new(),
        }
    }

    pub async fn analyser(&self) -> MediaResult<Arc<Mutex<Box<dyn FaceAnalyser>>>> {
        self.analyser
            .get_or_try_init(|| async {
                info!("Loading face analyser");
                self.loader.load_analyser().await
            })
            .await
    }

    pub async fn swapper(&self) -> MediaResult<Arc<Mutex<Box<dyn FaceSwapper>>>> {
        self.swapper
            .get_or_try_init(|| async {
                info!("Loading face swapper");
                self.loader.load_swapper().await
            })
            .await
    }

    pub async fn enhancer(&self) -> MediaResult<Arc<Mutex<Box<dyn FaceEnhancer>>>> {
        self.enhancer
            .get_or_try_init(|| async {
                info!("Loading face enhancer");
                self.loader.load_enhancer().await
            })
            .await
    }

    pub async fn model_available(&self, stage: StageName) -> MediaResult<bool> {
        self.loader.model_available(stage).await
    }

    /// Release transient accelerator memory when the job's providers need it.
    pub async fn release(&self, opts: &InferenceOptions) -> MediaResult<()> {
        if !opts.needs_release() {
            return Ok(());
        }
        debug!("Releasing accelerator resources");
        self.loader.release_resources(opts).await
    }

    pub fn loaded(&self) -> (bool, bool, bool) {
        (
            self.analyser.is_initialized(),
            self.swapper.is_initialized(),
            self.enhancer.is_initialized(),
        )
    }
}
