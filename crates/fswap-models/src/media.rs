//! Media classification and frame rates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{IMAGE_OUTPUT_EXTENSION, VIDEO_OUTPUT_EXTENSION};

/// Kind of a target file, decided from its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MediaKind::Unknown)
    }

    /// Extension of the output produced for this kind of target.
    pub fn output_extension(&self) -> Option<&'static str> {
        match self {
            MediaKind::Image => Some(IMAGE_OUTPUT_EXTENSION),
            MediaKind::Video => Some(VIDEO_OUTPUT_EXTENSION),
            MediaKind::Unknown => None,
        }
    }

    /// Classify a MIME type string (`image/png`, `video/mp4`, ...).
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Unknown
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rational frame rate as reported by the probe (`30000/1001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Parse `num/den` or a plain integer.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((num, den)) => Self::new(num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => Self::new(s.parse().ok()?, 1),
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mime() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/quicktime"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Unknown);
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(MediaKind::Image.output_extension(), Some("png"));
        assert_eq!(MediaKind::Video.output_extension(), Some("mp4"));
        assert_eq!(MediaKind::Unknown.output_extension(), None);
    }

    #[test]
    fn test_parse_frame_rate() {
        let rate = FrameRate::parse("30000/1001").unwrap();
        assert!((rate.as_f64() - 29.97).abs() < 0.01);
        assert_eq!(FrameRate::parse("25").unwrap(), FrameRate { num: 25, den: 1 });
        assert!(FrameRate::parse("0/0").is_none());
        assert!(FrameRate::parse("N/A").is_none());
    }
}
