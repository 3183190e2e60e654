//! Video encoding configuration for frame reassembly.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video encoder (H.264)
pub const DEFAULT_VIDEO_ENCODER: &str = "libx264";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 18;
/// Pixel format for reassembled video
pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";
/// Pixel format for extracted frames
pub const FRAME_PIXEL_FORMAT: &str = "rgb24";
/// bt601 -> bt709 conversion; without it reassembled output looks washed out
pub const COLORSPACE_FILTER: &str = "colorspace=bt709:iall=bt601-6-625:fast=1";
/// Frame rate used when the target's rate is not kept or cannot be detected
pub const DEFAULT_FPS: f64 = 30.0;
/// Frame file naming pattern (1-indexed, 4-digit zero padded)
pub const FRAME_PATTERN: &str = "%04d.png";
/// Frame file extension
pub const FRAME_EXTENSION: &str = "png";
/// Name of the assembled video inside a temp workspace
pub const TEMP_VIDEO_NAME: &str = "temp.mp4";
/// Container extension for video outputs
pub const VIDEO_OUTPUT_EXTENSION: &str = "mp4";
/// Extension for image outputs
pub const IMAGE_OUTPUT_EXTENSION: &str = "png";

/// Encoding configuration for the codec tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video encoder (e.g., "libx264", "h264_nvenc")
    #[serde(default = "default_video_encoder")]
    pub encoder: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Hardware acceleration mode passed as `-hwaccel` ("auto", "none", ...)
    #[serde(default = "default_hwaccel")]
    pub hwaccel: String,

    /// FFmpeg `-loglevel`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_video_encoder() -> String {
    DEFAULT_VIDEO_ENCODER.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_hwaccel() -> String {
    "auto".to_string()
}
fn default_log_level() -> String {
    "error".to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            encoder: default_video_encoder(),
            crf: DEFAULT_CRF,
            hwaccel: default_hwaccel(),
            log_level: default_log_level(),
        }
    }
}

impl EncodingConfig {
    /// Map an application log level to the FFmpeg `-loglevel` vocabulary.
    pub fn ffmpeg_log_level(level: &str) -> &'static str {
        match level.to_lowercase().as_str() {
            "debug" => "debug",
            "info" => "info",
            "warning" | "warn" => "warning",
            "critical" | "fatal" => "fatal",
            _ => "error",
        }
    }

    /// Whether `-hwaccel` should be passed at all.
    pub fn uses_hwaccel(&self) -> bool {
        !self.hwaccel.is_empty() && self.hwaccel != "none"
    }
}
