//! Job executor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn, Instrument};

use fswap_models::{select_available, Job, JobAck, JobId, JobState, LastUsedPaths};
use fswap_progress::{ProgressChannel, ProgressSender};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::last_used::LastUsedStore;
use crate::logging::JobLogger;
use crate::runner::JobRunner;

pub const JOBS_SUBMITTED_TOTAL: &str = "fswap_jobs_submitted_total";
pub const JOBS_FINISHED_TOTAL: &str = "fswap_jobs_finished_total";

/// Finished jobs kept for state queries before the oldest are forgotten.
pub const FINISHED_JOBS_RETAINED: usize = 256;

struct JobHandle {
    cancel: watch::Sender<bool>,
    state: Arc<watch::Sender<JobState>>,
    submitted_at: Instant,
}

impl JobHandle {
    fn is_finished(&self) -> bool {
        self.state.borrow().is_terminal()
    }
}

/// Accepts jobs and runs each on its own task.
///
/// Submission returns at once. At most `max_concurrent_jobs` jobs run at a
/// time; the rest wait for a slot. Targets inside a job stay sequential.
pub struct JobExecutor {
    config: WorkerConfig,
    runner: Arc<JobRunner>,
    progress: ProgressChannel,
    job_semaphore: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<JobId, JobHandle>>>,
    last_used: Option<LastUsedStore>,
    available_providers: Option<Vec<String>>,
    finished_retained: usize,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, runner: JobRunner, progress: ProgressChannel) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            runner: Arc::new(runner),
            progress,
            job_semaphore,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            last_used: None,
            available_providers: None,
            finished_retained: FINISHED_JOBS_RETAINED,
        }
    }

    /// Remember the source and first target of every submission.
    pub fn with_last_used(mut self, store: LastUsedStore) -> Self {
        self.last_used = Some(store);
        self
    }

    /// Runtime provider names the inference backend reported.
    ///
    /// Each submitted job keeps only the requested providers found here.
    pub fn with_available_providers(mut self, providers: Vec<String>) -> Self {
        self.available_providers = Some(providers);
        self
    }

    /// How many finished jobs stay queryable.
    pub fn with_finished_retention(mut self, retained: usize) -> Self {
        self.finished_retained = retained;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    /// Validate and start a job. Never waits for the job itself.
    pub async fn submit(&self, mut job: Job) -> WorkerResult<JobAck> {
        job.validate().map_err(WorkerError::Configuration)?;

        if let Some(available) = &self.available_providers {
            let requested = std::mem::take(&mut job.options.execution_providers);
            job.options.execution_providers = select_available(&requested, available);
            if job.options.execution_providers.is_empty() {
                let names: Vec<&str> = requested.iter().map(|p| p.as_str()).collect();
                return Err(WorkerError::Configuration(format!(
                    "None of the requested execution providers is available: {}",
                    names.join(", ")
                )));
            }
            if job.options.execution_providers.len() < requested.len() {
                info!(
                    job_id = %job.id,
                    providers = ?job.options.execution_providers,
                    "Dropped unavailable execution providers"
                );
            }
        }

        if let (Some(store), Some(target)) = (&self.last_used, job.target_paths.first()) {
            let paths = LastUsedPaths::new(&job.source_path, target);
            if let Err(e) = store.save(&paths).await {
                warn!(job_id = %job.id, "Failed to save last-used paths: {}", e);
            }
        }

        let ack = JobAck::started(&job);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(JobState::Pending);
        let state = Arc::new(state_tx);
        {
            let mut jobs = self.lock_jobs();
            prune_finished(&mut jobs, self.finished_retained);
            jobs.insert(
                job.id.clone(),
                JobHandle {
                    cancel: cancel_tx,
                    state: Arc::clone(&state),
                    submitted_at: Instant::now(),
                },
            );
        }
        metrics::counter!(JOBS_SUBMITTED_TOTAL).increment(1);
        info!(job_id = %job.id, targets = job.target_paths.len(), "Job submitted");

        let runner = Arc::clone(&self.runner);
        let semaphore = Arc::clone(&self.job_semaphore);
        let sender = self.progress.sender(job.id.clone());

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %job.id, "Executor closed before job started");
                    state.send_replace(JobState::Failed);
                    return;
                }
            };
            Self::execute_job(runner, job, sender, cancel_rx, state).await;
        });

        Ok(ack)
    }

    async fn execute_job(
        runner: Arc<JobRunner>,
        job: Job,
        sender: ProgressSender,
        cancel: watch::Receiver<bool>,
        state: Arc<watch::Sender<JobState>>,
    ) {
        let logger = JobLogger::new(&job.id, "face_swap");
        let span = logger.create_span();

        async move {
            state.send_replace(JobState::Running);

            let final_state = match runner.run(&job, &sender, cancel).await {
                Ok(report) => report.state,
                Err(WorkerError::Cancelled) => JobState::Cancelled,
                Err(e) => {
                    logger.log_error(&e.to_string());
                    JobState::Failed
                }
            };

            metrics::counter!(JOBS_FINISHED_TOTAL, "state" => final_state.as_str()).increment(1);
            state.send_replace(final_state);
        }
        .instrument(span)
        .await
    }

    /// Signal a job to stop. Returns false for unknown or finished jobs.
    ///
    /// The in-flight codec call finishes first; the job then cleans the
    /// current target's workspace and ends with a `Complete` event.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let jobs = self.lock_jobs();
        match jobs.get(job_id) {
            Some(handle) if !handle.is_finished() => {
                info!(job_id = %job_id, "Cancelling job");
                handle.cancel.send_replace(true);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, job_id: &JobId) -> Option<JobState> {
        self.lock_jobs()
            .get(job_id)
            .map(|handle| *handle.state.borrow())
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self, job_id: &JobId) -> Option<JobState> {
        let mut rx = {
            let jobs = self.lock_jobs();
            jobs.get(job_id)?.state.subscribe()
        };
        let state = *rx.wait_for(|s| s.is_terminal()).await.ok()?;
        Some(state)
    }

    /// Cancel every job and wait for running ones to wind down.
    pub async fn shutdown(&self) {
        let running: Vec<JobId> = {
            let jobs = self.lock_jobs();
            jobs.iter()
                .filter(|(_, handle)| !handle.is_finished())
                .map(|(id, handle)| {
                    handle.cancel.send_replace(true);
                    id.clone()
                })
                .collect()
        };
        info!("Shutting down executor, {} job(s) still active", running.len());

        let slots = self.config.max_concurrent_jobs as u32;
        match tokio::time::timeout(
            self.config.shutdown_timeout,
            self.job_semaphore.acquire_many(slots),
        )
        .await
        {
            Ok(Ok(_permits)) => info!("Job executor stopped"),
            Ok(Err(_)) => warn!("Job semaphore closed during shutdown"),
            Err(_) => warn!(
                "Shutdown timed out after {:?} with jobs still running",
                self.config.shutdown_timeout
            ),
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drop the oldest finished jobs so at most `retained` remain.
fn prune_finished(jobs: &mut HashMap<JobId, JobHandle>, retained: usize) {
    let mut finished: Vec<(Instant, JobId)> = jobs
        .iter()
        .filter(|(_, handle)| handle.is_finished())
        .map(|(id, handle)| (handle.submitted_at, id.clone()))
        .collect();
    if finished.len() <= retained {
        return;
    }
    finished.sort();
    let excess = finished.len() - retained;
    for (_, id) in finished.into_iter().take(excess) {
        jobs.remove(&id);
    }
    debug!(pruned = excess, "Forgot finished jobs");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_file, FakeCodec};
    use fswap_media::testing::FakeInference;
    use fswap_media::PathPolicy;
    use fswap_models::{ExecutionProvider, JobEvent, JobOptions, ProgressEvent};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    fn executor(dir: &Path, codec: FakeCodec, max_jobs: usize) -> JobExecutor {
        executor_with(dir, codec, max_jobs, &FakeInference::new())
    }

    fn executor_with(
        dir: &Path,
        codec: FakeCodec,
        max_jobs: usize,
        fake: &FakeInference,
    ) -> JobExecutor {
        let config = WorkerConfig {
            max_concurrent_jobs: max_jobs,
            work_dir: dir.join("work"),
            shutdown_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        };
        let runner = JobRunner::new(
            Arc::new(codec),
            fake.handles(),
            PathPolicy::new(&config.work_dir),
        );
        JobExecutor::new(config, runner, ProgressChannel::new())
    }

    async fn inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let source = write_file(dir, "face.jpg", b"face").await;
        let target = write_file(dir, "target.png", b"target").await;
        (source, target)
    }

    /// Drain events until every given job has completed.
    async fn collect_until_complete(channel: &ProgressChannel, jobs: usize) -> Vec<JobEvent> {
        let mut events = Vec::new();
        let mut complete = 0;
        while complete < jobs {
            let event = tokio::time::timeout(Duration::from_secs(5), channel.recv())
                .await
                .unwrap()
                .unwrap();
            if event.event.is_complete() {
                complete += 1;
            }
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_submit_acknowledges_immediately() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let executor = executor(dir.path(), FakeCodec::new(), 2);
        let job = Job::new(&source, vec![target], dir.path().join("out"));
        let job_id = job.id.clone();

        let ack = executor.submit(job).await.unwrap();
        assert_eq!(ack.status, "Processing started");
        assert_eq!(ack.job_id, job_id);

        assert_eq!(executor.wait(&job_id).await, Some(JobState::Completed));
        let events = collect_until_complete(executor.progress(), 1).await;
        assert!(events.iter().all(|e| e.job_id == job_id));
        assert!(dir.path().join("out").join("face-target.png").exists());
    }

    #[tokio::test]
    async fn test_invalid_job_is_rejected() {
        let dir = TempDir::new().unwrap();
        let executor = executor(dir.path(), FakeCodec::new(), 2);
        let job = Job::new(dir.path().join("face.jpg"), vec![], dir.path().join("out"));
        let job_id = job.id.clone();

        let err = executor.submit(job).await.unwrap_err();
        assert!(matches!(err, WorkerError::Configuration(_)));
        assert_eq!(executor.state(&job_id), None);
        assert!(executor.progress().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_get_disjoint_outputs() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let executor = executor(dir.path(), FakeCodec::new(), 2);
        let out = dir.path().join("out");

        let first = Job::new(&source, vec![target.clone()], &out);
        let second = Job::new(&source, vec![target.clone()], &out);
        let ids = [first.id.clone(), second.id.clone()];
        executor.submit(first).await.unwrap();
        executor.submit(second).await.unwrap();

        let events = collect_until_complete(executor.progress(), 2).await;
        let mut outputs = HashSet::new();
        for event in &events {
            if let ProgressEvent::Complete { output_files, .. } = &event.event {
                assert_eq!(output_files.len(), 1);
                outputs.insert(output_files[0].clone());
            }
        }
        assert_eq!(outputs.len(), 2);
        for path in &outputs {
            assert!(path.exists());
        }
        for id in &ids {
            assert_eq!(executor.wait(id).await, Some(JobState::Completed));
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_per_job() {
        let dir = TempDir::new().unwrap();
        let source = write_file(dir.path(), "face.jpg", b"face").await;
        let mut targets = Vec::new();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            targets.push(write_file(dir.path(), name, b"t").await);
        }
        let executor = executor(dir.path(), FakeCodec::new(), 1);
        executor
            .submit(Job::new(&source, targets, dir.path().join("out")))
            .await
            .unwrap();

        let events = collect_until_complete(executor.progress(), 1).await;
        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e.event {
                ProgressEvent::Progress { progress } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[tokio::test]
    async fn test_cancel_cleans_current_workspace() {
        let dir = TempDir::new().unwrap();
        let source = write_file(dir.path(), "face.jpg", b"face").await;
        let first = write_file(dir.path(), "one.mp4", b"video").await;
        let second = write_file(dir.path(), "two.mp4", b"video").await;
        let codec = FakeCodec {
            extract_delay: Duration::from_millis(200),
            ..FakeCodec::new()
        };
        let executor = executor(dir.path(), codec, 1);

        let job = Job::new(&source, vec![first, second], dir.path().join("out")).with_options(
            JobOptions {
                keep_audio: false,
                ..Default::default()
            },
        );
        let job_id = job.id.clone();
        executor.submit(job).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(executor.cancel(&job_id));
        assert_eq!(executor.wait(&job_id).await, Some(JobState::Cancelled));
        assert!(!executor.cancel(&job_id));

        let events = collect_until_complete(executor.progress(), 1).await;
        assert!(events
            .iter()
            .any(|e| e.event == ProgressEvent::message("Processing cancelled")));
        assert!(!dir.path().join("work").join(job_id.as_str()).exists());
        assert!(!dir.path().join("out").join("face-two.mp4").exists());
    }

    #[tokio::test]
    async fn test_unavailable_provider_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let fake = FakeInference::new();
        let executor = executor_with(dir.path(), FakeCodec::new(), 1, &fake)
            .with_available_providers(vec!["CPUExecutionProvider".to_string()]);

        let job = Job::new(&source, vec![target], dir.path().join("out")).with_options(JobOptions {
            execution_providers: vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu],
            ..Default::default()
        });
        let job_id = job.id.clone();
        executor.submit(job).await.unwrap();

        assert_eq!(executor.wait(&job_id).await, Some(JobState::Completed));
        assert_eq!(fake.swap_providers(), vec![ExecutionProvider::Cpu]);
        assert_eq!(fake.releases(), 0);
    }

    #[tokio::test]
    async fn test_no_available_provider_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let executor = executor(dir.path(), FakeCodec::new(), 1)
            .with_available_providers(vec!["CPUExecutionProvider".to_string()]);

        let job = Job::new(&source, vec![target], dir.path().join("out")).with_options(JobOptions {
            execution_providers: vec![ExecutionProvider::Rocm],
            ..Default::default()
        });
        let job_id = job.id.clone();

        let err = executor.submit(job).await.unwrap_err();
        assert!(matches!(err, WorkerError::Configuration(ref msg) if msg.contains("rocm")));
        assert_eq!(executor.state(&job_id), None);
    }

    #[tokio::test]
    async fn test_finished_jobs_are_pruned() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let executor = executor(dir.path(), FakeCodec::new(), 1).with_finished_retention(1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let job = Job::new(&source, vec![target.clone()], dir.path().join("out"));
            ids.push(job.id.clone());
            executor.submit(job).await.unwrap();
            assert_eq!(executor.wait(ids.last().unwrap()).await, Some(JobState::Completed));
        }

        assert_eq!(executor.state(&ids[0]), None);
        assert_eq!(executor.state(&ids[1]), Some(JobState::Completed));
        assert_eq!(executor.state(&ids[2]), Some(JobState::Completed));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let dir = TempDir::new().unwrap();
        let executor = executor(dir.path(), FakeCodec::new(), 1);
        assert!(!executor.cancel(&JobId::from_string("missing")));
    }

    #[tokio::test]
    async fn test_submission_saves_last_used_pair() {
        let dir = TempDir::new().unwrap();
        let (source, target) = inputs(dir.path()).await;
        let store = LastUsedStore::new(dir.path().join("last_used_paths.json"));
        let executor = executor(dir.path(), FakeCodec::new(), 1).with_last_used(store.clone());

        let job = Job::new(&source, vec![target.clone()], dir.path().join("out"));
        let job_id = job.id.clone();
        executor.submit(job).await.unwrap();
        executor.wait(&job_id).await;

        let saved = store.load().await.unwrap();
        assert_eq!(saved, LastUsedPaths::new(source, target));
    }
}
