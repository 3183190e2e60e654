//! Face references produced by the external detector capability.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Opaque handle to a detected face.
///
/// The pipeline only reads `bbox` (for primary-face selection); the
/// embedding and landmarks are passed back to the inference service as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceRef {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<[f32; 2]>,
}

impl FaceRef {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            score: 1.0,
            embedding: Vec::new(),
            landmarks: Vec::new(),
        }
    }
}

/// Pick the primary face: leftmost bounding box by x.
///
/// Ties keep the first face in detector order.
pub fn primary_face(faces: &[FaceRef]) -> Option<&FaceRef> {
    faces
        .iter()
        .min_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x))
}
