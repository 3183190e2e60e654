//! Frame reassembly and audio restoration.

use std::path::Path;
use tracing::{debug, info};

use fswap_models::encoding::{EncodingConfig, COLORSPACE_FILTER, OUTPUT_PIXEL_FORMAT};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frames::FrameSet;

/// Format a frame rate for `-r` without trailing zeros (`30`, `29.97`).
pub fn format_fps(fps: f64) -> String {
    let text = format!("{:.6}", fps);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Build the reassembly command for `frames` at `fps`.
pub fn assemble_command(
    encoding: &EncodingConfig,
    frames: &FrameSet,
    fps: f64,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::with_encoding("assemble", encoding, output)
        .input_with_args(["-r".to_string(), format_fps(fps)], frames.pattern())
        .video_codec(encoding.encoder.clone())
        .crf(encoding.crf)
        .pixel_format(OUTPUT_PIXEL_FORMAT)
        .video_filter(COLORSPACE_FILTER)
        .overwrite()
}

/// Remux the first audio stream of `original` onto `video` without re-encoding.
pub fn restore_audio_command(
    encoding: &EncodingConfig,
    video: &Path,
    original: &Path,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::with_encoding("restore_audio", encoding, output)
        .input(video)
        .input(original)
        .video_codec("copy")
        .map("0:v:0")
        .map("1:a:0")
        .overwrite()
}

/// Re-encode `frames` into a video at `output`.
///
/// Fails with `AssemblyFailed` on an empty frame set or when FFmpeg errors.
pub async fn assemble_frames(
    runner: &FfmpegRunner,
    encoding: &EncodingConfig,
    frames: &FrameSet,
    fps: f64,
    output: &Path,
) -> MediaResult<()> {
    if frames.is_empty() {
        return Err(MediaError::assembly_failed("frame set is empty"));
    }
    if !(fps.is_finite() && fps > 0.0) {
        return Err(MediaError::assembly_failed(format!("invalid frame rate {fps}")));
    }

    let cmd = assemble_command(encoding, frames, fps, output);
    let total = frames.len();

    info!(frames = total, fps, output = %output.display(), "Assembling video");
    runner
        .run_with_progress(&cmd, move |progress| {
            debug!(
                frame = progress.frame,
                percent = progress.frame_percentage(total),
                speed = progress.speed,
                out_time = %progress.out_time,
                "Assembly progress"
            );
        })
        .await
        .map_err(|e| match e {
            MediaError::FfmpegFailed { .. } => MediaError::assembly_failed(e.detail()),
            other => other,
        })?;

    if !output.exists() {
        return Err(MediaError::assembly_failed(format!(
            "FFmpeg produced no output at {}",
            output.display()
        )));
    }
    Ok(())
}

/// Copy the audio of `original` onto `video`, writing `output`.
///
/// Fails with `AudioRestoreFailed` when `video` is missing or the remux fails
/// (including when `original` has no audio stream).
pub async fn restore_audio(
    runner: &FfmpegRunner,
    encoding: &EncodingConfig,
    original: &Path,
    video: &Path,
    output: &Path,
) -> MediaResult<()> {
    if !video.exists() {
        return Err(MediaError::audio_restore_failed(format!(
            "assembled video missing: {}",
            video.display()
        )));
    }

    let cmd = restore_audio_command(encoding, video, original, output);
    info!(original = %original.display(), output = %output.display(), "Restoring audio");

    runner.run(&cmd).await.map_err(|e| match e {
        MediaError::FfmpegNotFound | MediaError::Timeout(_) => e,
        other => MediaError::audio_restore_failed(other.detail()),
    })
}
