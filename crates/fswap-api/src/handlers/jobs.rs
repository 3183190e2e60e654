//! Job submission, progress stream and cancellation.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use fswap_media::is_known_media;
use fswap_models::{
    suggest_execution_threads, ExecutionProvider, Job, JobAck, JobEvent, JobId, JobOptions,
    JobState, StageName,
};
use fswap_progress::encode_event;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Fields collected from the `/process` form.
#[derive(Debug, Default)]
struct ProcessForm {
    source: Option<PathBuf>,
    targets: Vec<PathBuf>,
    output_dir: Option<String>,
    face_enhancer: bool,
    keep_fps: bool,
    keep_audio: bool,
    keep_frames: bool,
    many_faces: bool,
    max_memory: Option<u32>,
    execution_threads: Option<u32>,
    execution_providers: Vec<ExecutionProvider>,
}

impl ProcessForm {
    /// Checkboxes count as set whenever the field is present.
    fn into_job(self, default_output_dir: &Path) -> ApiResult<Job> {
        let source = self
            .source
            .ok_or_else(|| ApiError::bad_request("No source file provided"))?;
        if self.targets.is_empty() {
            return Err(ApiError::bad_request("No target files provided"));
        }

        let mut stages = vec![StageName::FaceSwapper];
        if self.face_enhancer {
            stages.push(StageName::FaceEnhancer);
        }

        let defaults = JobOptions::default();
        let execution_providers = if self.execution_providers.is_empty() {
            defaults.execution_providers.clone()
        } else {
            self.execution_providers
        };
        let options = JobOptions {
            stages,
            many_faces: self.many_faces,
            keep_fps: self.keep_fps,
            keep_audio: self.keep_audio,
            keep_frames: self.keep_frames,
            max_memory: self.max_memory.unwrap_or(defaults.max_memory),
            execution_threads: self
                .execution_threads
                .unwrap_or_else(|| suggest_execution_threads(&execution_providers)),
            execution_providers,
        };

        let output_dir = self
            .output_dir
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_dir.to_path_buf());

        Ok(Job::new(source, self.targets, output_dir).with_options(options))
    }
}

/// Submit a job from a multipart form.
///
/// Uploads land in a fresh directory under the upload root so concurrent
/// submissions never overwrite each other's files.
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<JobAck>> {
    let batch_dir = state.config.upload_dir.join(Uuid::new_v4().simple().to_string());

    let job = match prepare_job(&mut multipart, &batch_dir, &state.config.default_output_dir).await
    {
        Ok(job) => job,
        Err(e) => {
            discard_uploads(&batch_dir).await;
            return Err(e);
        }
    };

    info!(
        job_id = %job.id,
        targets = job.target_paths.len(),
        "Submitting job from upload"
    );
    let ack = state.executor.submit(job).await?;
    Ok(Json(ack))
}

async fn prepare_job(
    multipart: &mut Multipart,
    batch_dir: &Path,
    default_output_dir: &Path,
) -> ApiResult<Job> {
    let form = read_form(multipart, batch_dir).await?;
    check_media(&form).await?;
    form.into_job(default_output_dir)
}

async fn read_form(multipart: &mut Multipart, batch_dir: &Path) -> ApiResult<ProcessForm> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "source_file" => {
                if let Some(path) = save_upload(field, &name, batch_dir).await? {
                    form.source = Some(path);
                }
            }
            "target_files" => {
                if let Some(path) = save_upload(field, &name, batch_dir).await? {
                    form.targets.push(path);
                }
            }
            "output_dir" => form.output_dir = Some(field_text(field).await?),
            "face_enhancer" => form.face_enhancer = true,
            "keep_fps" => form.keep_fps = true,
            "keep_audio" => form.keep_audio = true,
            "keep_frames" => form.keep_frames = true,
            "many_faces" => form.many_faces = true,
            "max_memory" => form.max_memory = parse_number(&name, field).await?,
            "execution_threads" => form.execution_threads = parse_number(&name, field).await?,
            "execution_provider" => {
                let value = field_text(field).await?;
                let provider = value
                    .parse::<ExecutionProvider>()
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                form.execution_providers.push(provider);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed form data: {}", e)))
}

async fn parse_number(name: &str, field: Field<'_>) -> ApiResult<Option<u32>> {
    let value = field_text(field).await?;
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| ApiError::bad_request(format!("{} must be a positive integer", name)))
}

/// Stream one uploaded file to disk. Empty file inputs are skipped.
async fn save_upload(
    mut field: Field<'_>,
    field_name: &str,
    batch_dir: &Path,
) -> ApiResult<Option<PathBuf>> {
    let Some(file_name) = field.file_name().map(sanitize_file_name) else {
        return Ok(None);
    };
    if file_name.is_empty() {
        return Ok(None);
    }

    tokio::fs::create_dir_all(batch_dir).await?;
    let path = unique_upload_path(batch_dir, &file_name).await?;
    let mut file = tokio::fs::File::create(&path).await?;
    let mut bytes = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {}", e)))?
    {
        bytes += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    metrics::record_upload(field_name, bytes);
    Ok(Some(path))
}

/// Path in `batch_dir` for `file_name` that no earlier upload of the batch uses.
///
/// Repeated names get a counter before the extension: `clip.mp4`, `clip-2.mp4`.
async fn unique_upload_path(batch_dir: &Path, file_name: &str) -> ApiResult<PathBuf> {
    let candidate = batch_dir.join(file_name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().to_string());
    for n in 2u32.. {
        let renamed = match &ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = batch_dir.join(renamed);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(ApiError::Internal(format!("No free upload name for {}", file_name)))
}

/// Keep only the final path component and a conservative character set.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

async fn check_media(form: &ProcessForm) -> ApiResult<()> {
    for path in form.source.iter().chain(form.targets.iter()) {
        if !is_known_media(path).await {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(ApiError::bad_request(format!(
                "Unsupported file type: {}",
                name
            )));
        }
    }
    Ok(())
}

async fn discard_uploads(batch_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(batch_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %batch_dir.display(), "Failed to discard uploads: {}", e);
        }
    }
}

/// Decrements the active-connection gauge when the stream is dropped.
struct SseConnection;

impl SseConnection {
    fn open() -> Self {
        metrics::sse_connected();
        Self
    }
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        metrics::sse_disconnected();
    }
}

/// Stream progress records as server-sent events.
///
/// Records are drained from the shared channel: each one reaches exactly
/// one connected client.
pub async fn status(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let connection = SseConnection::open();
    let stream = state.progress.stream().map(move |event| {
        let _connection = &connection;
        Ok(sse_event(&event))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &JobEvent) -> Event {
    match encode_event(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!(job_id = %event.job_id, "Failed to encode progress event: {}", e);
            Event::default().comment("unencodable progress event")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub state: JobState,
}

pub async fn job_status(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = JobId::from_string(job_id);
    let job_state = state
        .executor
        .state(&job_id)
        .ok_or_else(|| ApiError::not_found(format!("Unknown job: {}", job_id)))?;
    Ok(Json(JobStatusResponse {
        job_id,
        state: job_state,
    }))
}

/// Signal cancellation. The job winds down on its own task.
pub async fn cancel_job(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = JobId::from_string(job_id);
    let Some(current) = state.executor.state(&job_id) else {
        return Err(ApiError::not_found(format!("Unknown job: {}", job_id)));
    };
    if !state.executor.cancel(&job_id) {
        return Err(ApiError::conflict(format!(
            "Job {} already finished ({})",
            job_id, current
        )));
    }
    Ok(Json(JobStatusResponse {
        job_id,
        state: current,
    }))
}
