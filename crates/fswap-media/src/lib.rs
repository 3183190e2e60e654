//! Media handling and frame processing for the face-swap pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with `-progress pipe:2` parsing
//! - Content-based media classification and FFprobe frame rates
//! - Frame extraction, reassembly and audio restoration
//! - Output naming and temp workspace layout
//! - Capability traits for the external inference service
//! - The ordered frame processor chain and its stages

pub mod assemble;
pub mod codec;
pub mod command;
pub mod core;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod paths;
pub mod probe;
pub mod processors;
pub mod progress;
#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use assemble::{assemble_frames, restore_audio};
pub use codec::{FfmpegCodec, VideoCodec};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use self::core::{
    detect_all_faces, detect_primary_face, ContentSafetyClassifier, FaceAnalyser, FaceEnhancer,
    FaceSwapper, InferenceHandle, InferenceHandles, InferenceOptions, ModelLoader, StageContext,
};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frames, FrameSet};
pub use paths::{OutputClaim, PathPolicy, TempWorkspace};
pub use probe::{classify, frame_rate, is_known_media, probe_video, VideoInfo};
pub use processors::{FrameProcessor, ProcessorChain, ProcessorStage, StageRegistry};
pub use progress::FfmpegProgress;
