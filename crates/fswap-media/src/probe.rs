//! Media classification and FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use fswap_models::{FrameRate, MediaKind};

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Classify a file by its content, not its extension.
pub async fn classify(path: impl AsRef<Path>) -> MediaResult<MediaKind> {
    let path = path.as_ref().to_path_buf();
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path));
    }

    let kind = tokio::task::spawn_blocking(move || infer::get_from_path(&path))
        .await
        .map_err(|e| MediaError::InvalidVideo(format!("content sniffing task failed: {e}")))??;

    Ok(kind
        .map(|t| MediaKind::from_mime(t.mime_type()))
        .unwrap_or(MediaKind::Unknown))
}

/// Whether the file is an image or video the pipeline can process.
pub async fn is_known_media(path: impl AsRef<Path>) -> bool {
    matches!(classify(path).await, Ok(kind) if kind.is_known())
}

/// Read the frame rate of the first video stream.
pub async fn frame_rate(path: impl AsRef<Path>) -> MediaResult<FrameRate> {
    let path = path.as_ref();
    let stdout = run_ffprobe(
        [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ],
        path,
    )
    .await?;

    let text = String::from_utf8_lossy(&stdout);
    let line = text.lines().next().unwrap_or_default();
    FrameRate::parse(line).ok_or_else(|| MediaError::FfprobeFailed {
        message: format!("unparseable frame rate {:?} for {}", line, path.display()),
        stderr: None,
    })
}

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// File size in bytes
    pub size: u64,
    /// Whether the container carries at least one audio stream
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    let stdout = run_ffprobe(
        ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"],
        path,
    )
    .await?;

    parse_probe_output(&stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .r_frame_rate
        .as_deref()
        .or(video_stream.avg_frame_rate.as_deref())
        .and_then(FrameRate::parse)
        .map(|r| r.as_f64())
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
        has_audio,
    })
}

async fn run_ffprobe<const N: usize>(args: [&str; N], path: &Path) -> MediaResult<Vec<u8>> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    debug!("Running FFprobe: ffprobe {} {}", args.join(" "), path.display());

    let output = Command::new("ffprobe")
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const MP4_MAGIC: &[u8] = &[
        0x00, 0x00, 0x00, 0x14, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00, 0x02,
        0x00, b'i', b's', b'o', b'm',
    ];

    #[tokio::test]
    async fn test_classify_by_content_not_extension() {
        let dir = TempDir::new().unwrap();

        let disguised_image = dir.path().join("clip.mp4");
        tokio::fs::write(&disguised_image, PNG_MAGIC).await.unwrap();
        assert_eq!(classify(&disguised_image).await.unwrap(), MediaKind::Image);

        let video = dir.path().join("noext");
        tokio::fs::write(&video, MP4_MAGIC).await.unwrap();
        assert_eq!(classify(&video).await.unwrap(), MediaKind::Video);

        let text = dir.path().join("notes.png");
        tokio::fs::write(&text, b"just some text").await.unwrap();
        assert_eq!(classify(&text).await.unwrap(), MediaKind::Unknown);
        assert!(!is_known_media(&text).await);
    }

    #[tokio::test]
    async fn test_classify_missing_file() {
        let err = classify("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_parse_probe_output_detects_audio() {
        let json = br#"{
            "format": {"duration": "10.5", "size": "2048"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(info.has_audio);
        assert_eq!(info.width, 1280);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert!((info.duration - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_probe_output_silent_video() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "video", "r_frame_rate": "25/1"}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.fps, 25.0);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
