//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use fswap_models::EncodingConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Root for per-job temp workspaces
    pub work_dir: PathBuf,
    /// Default output directory when a job names none
    pub output_dir: PathBuf,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Reassembly encoder settings
    pub encoding: EncodingConfig,
    /// Upper bound for a single FFmpeg invocation
    pub ffmpeg_timeout: Option<u64>,
    /// Classify every target before processing
    pub safety_check_enabled: bool,
    /// Where the last-used source/target pair is stored
    pub last_used_paths_file: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/fswap"),
            output_dir: PathBuf::from("Output"),
            shutdown_timeout: Duration::from_secs(30),
            encoding: EncodingConfig::default(),
            ffmpeg_timeout: None,
            safety_check_enabled: true,
            last_used_paths_file: PathBuf::from("last_used_paths.json"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let encoding = EncodingConfig {
            encoder: std::env::var("WORKER_VIDEO_ENCODER").unwrap_or(defaults.encoding.encoder),
            crf: env_parse("WORKER_VIDEO_QUALITY").unwrap_or(defaults.encoding.crf),
            hwaccel: std::env::var("WORKER_HWACCEL").unwrap_or(defaults.encoding.hwaccel),
            log_level: std::env::var("WORKER_FFMPEG_LOG_LEVEL")
                .map(|level| EncodingConfig::ffmpeg_log_level(&level).to_string())
                .unwrap_or(defaults.encoding.log_level),
        };

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            shutdown_timeout: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(30),
            ),
            encoding,
            ffmpeg_timeout: env_parse("WORKER_FFMPEG_TIMEOUT"),
            safety_check_enabled: std::env::var("SAFETY_CHECK_ENABLED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(defaults.safety_check_enabled),
            last_used_paths_file: std::env::var("LAST_USED_PATHS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.last_used_paths_file),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
