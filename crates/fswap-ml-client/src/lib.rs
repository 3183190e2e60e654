//! Client for the external face inference service.
//!
//! Detection, swapping, enhancement and content classification run in a
//! separate model service sharing the worker's filesystem. Requests carry
//! file paths, never pixel data. [`MlClient`] implements every capability
//! trait of `fswap-media`, so it plugs straight into `InferenceHandles`.

pub mod capabilities;
pub mod client;
pub mod error;
pub mod types;

pub use client::{MlClient, MlClientConfig};
pub use error::{MlError, MlResult};
pub use types::{
    ClassifyRequest, ClassifyResponse, DetectRequest, DetectResponse, EnhanceRequest,
    HealthResponse, ModelStatus, ProvidersResponse, ReleaseRequest, SwapRequest,
};
