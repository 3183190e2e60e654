//! Inference service request/response types.

use fswap_media::InferenceOptions;
use fswap_models::{FaceRef, StageName};
use serde::{Deserialize, Serialize};

/// Face detection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Image to analyse
    pub image_path: String,
    pub options: InferenceOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    /// Faces in detector order
    #[serde(default)]
    pub faces: Vec<FaceRef>,
}

/// Face swap request. `output_path` may equal `input_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub source_face: FaceRef,
    pub target_faces: Vec<FaceRef>,
    pub input_path: String,
    pub output_path: String,
    pub options: InferenceOptions,
}

/// Face enhancement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub faces: Vec<FaceRef>,
    pub input_path: String,
    pub output_path: String,
    pub options: InferenceOptions,
}

/// Content classification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    #[serde(rename = "unsafe")]
    pub is_unsafe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Model availability for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub stage: StageName,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub options: InferenceOptions,
}

/// Runtime names reported by the inference backend (e.g. `CUDAExecutionProvider`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_response_field_name() {
        let parsed: ClassifyResponse = serde_json::from_str(r#"{"unsafe": true}"#).unwrap();
        assert!(parsed.is_unsafe);
        assert!(parsed.score.is_none());
    }

    #[test]
    fn test_detect_response_defaults_to_no_faces() {
        let parsed: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.faces.is_empty());
    }
}
