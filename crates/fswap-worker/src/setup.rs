//! Wiring shared by the CLI and the HTTP server.

use std::sync::Arc;

use tracing::{info, warn};

use fswap_media::{FfmpegCodec, InferenceHandles, PathPolicy};
use fswap_ml_client::MlClient;
use fswap_models::{select_available, ExecutionProvider};
use fswap_progress::ProgressChannel;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::executor::JobExecutor;
use crate::last_used::LastUsedStore;
use crate::runner::JobRunner;

/// Build an executor backed by FFmpeg and the inference service.
///
/// Fails when FFmpeg is missing. An unhealthy inference service is only
/// logged; stages then report not ready when a job starts. When the service
/// lists its providers, each job is narrowed to the ones it can run.
pub async fn build_executor(
    config: WorkerConfig,
    progress: ProgressChannel,
    providers: &[ExecutionProvider],
) -> WorkerResult<JobExecutor> {
    FfmpegCodec::check_available()?;
    let mut codec = FfmpegCodec::new(config.encoding.clone());
    if let Some(secs) = config.ffmpeg_timeout {
        codec = codec.with_timeout(secs);
    }

    let client = MlClient::from_env().map_err(|e| WorkerError::Configuration(e.to_string()))?;
    let mut available = None;
    match client.health_check().await {
        Ok(true) => match client.available_providers().await {
            Ok(list) => {
                let selected = select_available(providers, &list);
                if selected.is_empty() {
                    warn!(requested = ?providers, available = ?list, "No requested execution provider is available");
                } else {
                    info!(providers = ?selected, "Inference providers selected");
                }
                available = Some(list);
            }
            Err(e) => warn!("Failed to list inference providers: {}", e),
        },
        Ok(false) => warn!("Inference service is not healthy; stages may report not ready"),
        Err(e) => warn!("Inference health check failed: {}", e),
    }

    let handles = Arc::new(InferenceHandles::new(Arc::new(client.clone())));
    let mut runner = JobRunner::new(Arc::new(codec), handles, PathPolicy::new(&config.work_dir));
    if config.safety_check_enabled {
        runner = runner.with_classifier(Arc::new(client));
    }

    let last_used = LastUsedStore::new(&config.last_used_paths_file);
    let mut executor = JobExecutor::new(config, runner, progress).with_last_used(last_used);
    if let Some(list) = available {
        executor = executor.with_available_providers(list);
    }
    Ok(executor)
}
