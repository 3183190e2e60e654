//! Job runner.
//!
//! Owns one job's lifecycle: builds the processor chain, prepares every stage
//! before any target is touched, then walks the targets strictly in
//! submission order. Each target moves through
//! `Pending -> Classifying -> (ImagePath | VideoPath) -> Processing ->
//! [Assembling -> AudioRestoring] -> Finalizing -> Done`, or to `Failed`.
//!
//! Target-scoped failures are reported and the job moves on. Job-fatal
//! failures (stage not ready, rejected content, cancellation) stop the job,
//! but the final `Complete` event still lists every output produced so far.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use fswap_media::assemble::format_fps;
use fswap_media::fs_utils::move_file;
use fswap_media::{
    ContentSafetyClassifier, InferenceHandles, PathPolicy, ProcessorChain, StageContext,
    StageRegistry, TempWorkspace, VideoCodec,
};
use fswap_models::encoding::DEFAULT_FPS;
use fswap_models::{FailedTarget, Job, JobState, MediaKind, TargetOutcome, TargetState};
use fswap_progress::ProgressSender;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Counter of finished targets, labelled by result and failure kind.
pub const TARGETS_TOTAL: &str = "fswap_targets_total";

/// What a job produced.
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub state: JobState,
    /// One entry per target that reached a terminal state, in order
    pub outcomes: Vec<TargetOutcome>,
}

impl JobReport {
    pub fn output_files(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.output().cloned())
            .collect()
    }

    pub fn failed_targets(&self) -> Vec<FailedTarget> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TargetOutcome::Failed { target, error, .. } => Some(FailedTarget {
                    target: target.clone(),
                    error: error.clone(),
                }),
                TargetOutcome::Done { .. } => None,
            })
            .collect()
    }
}

/// Per-target state tracker.
struct TargetRun<'a> {
    /// 0-based position in the job
    index: usize,
    target: &'a Path,
    state: TargetState,
    progress: &'a ProgressSender,
}

impl<'a> TargetRun<'a> {
    fn new(index: usize, target: &'a Path, progress: &'a ProgressSender) -> Self {
        Self {
            index,
            target,
            state: TargetState::Pending,
            progress,
        }
    }

    /// Status line for the caller. A closed channel only loses the line.
    fn status(&self, text: impl Into<String>) {
        if let Err(e) = self.progress.message(text) {
            warn!(target = %self.target.display(), "Failed to publish status: {}", e);
        }
    }

    fn advance(&mut self, next: TargetState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal target transition {} -> {}",
            self.state,
            next
        );
        debug!(target = %self.target.display(), from = %self.state, to = %next, "Target state");
        self.state = next;
    }
}

/// Runs jobs. Cheap to clone; clones share the codec, inference handles and
/// output claims.
#[derive(Clone)]
pub struct JobRunner {
    codec: Arc<dyn VideoCodec>,
    handles: Arc<InferenceHandles>,
    classifier: Option<Arc<dyn ContentSafetyClassifier>>,
    paths: PathPolicy,
}

impl JobRunner {
    pub fn new(codec: Arc<dyn VideoCodec>, handles: Arc<InferenceHandles>, paths: PathPolicy) -> Self {
        Self {
            codec,
            handles,
            classifier: None,
            paths,
        }
    }

    /// Classify every target before processing it.
    pub fn with_classifier(mut self, classifier: Arc<dyn ContentSafetyClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn paths(&self) -> &PathPolicy {
        &self.paths
    }

    /// Run one job to its end, publishing progress on `progress`.
    ///
    /// Always ends the event stream with a `Complete` record. Returns an error
    /// only when the job was aborted.
    pub async fn run(
        &self,
        job: &Job,
        progress: &ProgressSender,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<JobReport> {
        let logger = JobLogger::new(&job.id, "face_swap");
        let mut report = JobReport::default();

        let result = self
            .run_targets(job, progress, cancel, &logger, &mut report)
            .await;

        match result {
            Ok(()) => {
                report.state = JobState::Completed;
                logger.log_completion(&format!(
                    "{} output(s), {} failed",
                    report.output_files().len(),
                    report.failed_targets().len()
                ));
                progress.complete(report.output_files(), report.failed_targets())?;
                Ok(report)
            }
            Err(err) => {
                let text = match &err {
                    WorkerError::Cancelled => {
                        report.state = JobState::Cancelled;
                        logger.log_warning("cancelled");
                        "Processing cancelled".to_string()
                    }
                    other => {
                        report.state = JobState::Failed;
                        logger.log_error(&other.to_string());
                        format!("Processing aborted: {}", other)
                    }
                };
                // the caller already has the error; a closed channel adds nothing
                let _ = progress.message(text);
                let _ = progress.complete(report.output_files(), report.failed_targets());
                Err(err)
            }
        }
    }

    async fn run_targets(
        &self,
        job: &Job,
        progress: &ProgressSender,
        cancel: watch::Receiver<bool>,
        logger: &JobLogger,
        report: &mut JobReport,
    ) -> WorkerResult<()> {
        job.validate().map_err(WorkerError::Configuration)?;

        let chain = StageRegistry::build(&job.options.stages, Arc::clone(&self.handles));
        let mut ctx = StageContext::new(job.id.clone(), &job.source_path, &job.options)
            .with_cancel(cancel);
        if ctx.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        chain.pre_check().await?;
        chain.pre_start(&mut ctx).await?;
        tokio::fs::create_dir_all(&job.output_dir).await?;

        let total = job.target_paths.len();
        let stage_names: Vec<&str> = chain.names().iter().map(|s| s.as_str()).collect();
        logger.log_start(&format!(
            "{} target(s), stages [{}]",
            total,
            stage_names.join(", ")
        ));

        for (index, target) in job.target_paths.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }
            logger.log_target(index + 1, total, target);
            progress.message(format!(
                "Processing {} ({}/{})",
                target.display(),
                index + 1,
                total
            ))?;

            let outcome = match self
                .run_target(job, &chain, &ctx, index, target, progress)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) if err.is_job_fatal() => return Err(err),
                Err(err) => {
                    logger.log_warning(&format!("{} failed: {}", target.display(), err));
                    TargetOutcome::Failed {
                        target: target.clone(),
                        kind: err.kind().to_string(),
                        error: err.to_string(),
                    }
                }
            };

            match &outcome {
                TargetOutcome::Done {
                    output, warnings, ..
                } => {
                    for warning in warnings {
                        progress.message(warning.clone())?;
                    }
                    progress.target_done(target.clone(), output.clone())?;
                    metrics::counter!(TARGETS_TOTAL, "result" => "done").increment(1);
                }
                TargetOutcome::Failed { kind, error, .. } => {
                    progress.message(format!("Failed to process {}: {}", target.display(), error))?;
                    progress.target_failed(target.clone(), error.clone())?;
                    metrics::counter!(TARGETS_TOTAL, "result" => "failed", "kind" => kind.clone())
                        .increment(1);
                }
            }
            report.outcomes.push(outcome);

            let fraction = 100.0 * (index + 1) as f64 / total as f64;
            logger.log_progress(&format!("{:.1}%", fraction));
            progress.progress(fraction)?;
        }

        Ok(())
    }

    async fn run_target(
        &self,
        job: &Job,
        chain: &ProcessorChain,
        ctx: &StageContext,
        index: usize,
        target: &Path,
        progress: &ProgressSender,
    ) -> WorkerResult<TargetOutcome> {
        let mut run = TargetRun::new(index, target, progress);
        let result = self.drive_target(job, chain, ctx, &mut run).await;
        if result.is_err() {
            run.advance(TargetState::Failed);
        }
        result
    }

    async fn drive_target(
        &self,
        job: &Job,
        chain: &ProcessorChain,
        ctx: &StageContext,
        run: &mut TargetRun<'_>,
    ) -> WorkerResult<TargetOutcome> {
        let target = run.target;

        run.advance(TargetState::Classifying);
        let kind = self.codec.classify(target).await?;
        if !kind.is_known() {
            return Err(WorkerError::UnsupportedMedia(target.to_path_buf()));
        }
        self.check_content(target).await?;

        let claim = self.paths.claim_output(
            &job.id,
            &job.source_path,
            target,
            kind,
            &job.output_dir,
        )?;
        let output = claim.path().to_path_buf();

        let result = match kind {
            MediaKind::Image => {
                run.advance(TargetState::ImagePath);
                run.advance(TargetState::Processing);
                chain
                    .process_image(ctx, target, &output)
                    .await
                    .map(|()| Vec::new())
                    .map_err(WorkerError::from)
            }
            _ => {
                run.advance(TargetState::VideoPath);
                self.run_video(job, chain, ctx, &output, run).await
            }
        };

        let warnings = match result {
            Ok(warnings) => warnings,
            Err(err) => {
                if output.exists() {
                    if let Err(e) = tokio::fs::remove_file(&output).await {
                        warn!(output = %output.display(), "Failed to remove partial output: {}", e);
                    }
                }
                return Err(err);
            }
        };

        if run.state != TargetState::Finalizing {
            run.advance(TargetState::Finalizing);
        }
        run.advance(TargetState::Done);
        Ok(TargetOutcome::Done {
            target: target.to_path_buf(),
            output,
            warnings,
        })
    }

    /// Video path. The workspace is removed afterwards, success or not,
    /// unless the job keeps its frames.
    async fn run_video(
        &self,
        job: &Job,
        chain: &ProcessorChain,
        ctx: &StageContext,
        output: &Path,
        run: &mut TargetRun<'_>,
    ) -> WorkerResult<Vec<String>> {
        let workspace = self.paths.workspace(&job.id, run.index, run.target);
        let result = self
            .process_video(job, chain, ctx, output, &workspace, run)
            .await;

        if job.options.keep_frames {
            debug!(dir = %workspace.dir().display(), "Keeping frames");
        } else if let Err(e) = workspace.clean().await {
            warn!(dir = %workspace.dir().display(), "Failed to clean workspace: {}", e);
        }
        result
    }

    async fn process_video(
        &self,
        job: &Job,
        chain: &ProcessorChain,
        ctx: &StageContext,
        output: &Path,
        workspace: &TempWorkspace,
        run: &mut TargetRun<'_>,
    ) -> WorkerResult<Vec<String>> {
        let target = run.target;
        if job.options.keep_audio && !job.options.keep_fps {
            run.status("Restoring audio might cause issues as fps are not kept...");
        }
        workspace.create().await?;

        run.status("Extracting frames...");
        let frames = self
            .codec
            .extract_frames(target, workspace.frames_dir())
            .await?;
        run.advance(TargetState::Processing);
        chain
            .process_frames_with(ctx, &frames, |stage| {
                run.status(format!("Progressing with {}...", stage))
            })
            .await?;
        if ctx.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        run.advance(TargetState::Assembling);
        let fps = self.resolve_fps(job, target).await;
        run.status(format!("Creating video with {} fps...", format_fps(fps)));
        let temp_video = workspace.temp_video();
        self.codec.assemble(&frames, fps, &temp_video).await?;

        let mut warnings = Vec::new();
        if job.options.keep_audio {
            run.advance(TargetState::AudioRestoring);
            if let Ok(false) = self.codec.has_audio(target).await {
                debug!(target = %target.display(), "Target has no audio track");
                run.status(format!(
                    "{} has no audio track; output will be silent",
                    target.display()
                ));
            }
            run.status("Restoring audio...");
            if let Err(e) = self.codec.restore_audio(target, &temp_video, output).await {
                let err = WorkerError::from(e);
                warn!(target = %target.display(), "{}; keeping silent video", err);
                warnings.push(format!("{}; output has no audio", err));
                move_file(&temp_video, output).await?;
            }
        } else {
            move_file(&temp_video, output).await?;
        }

        run.advance(TargetState::Finalizing);
        Ok(warnings)
    }

    /// Detected frame rate when the job keeps it, otherwise the default.
    async fn resolve_fps(&self, job: &Job, target: &Path) -> f64 {
        if !job.options.keep_fps {
            return DEFAULT_FPS;
        }
        match self.codec.frame_rate(target).await {
            Ok(rate) => rate.as_f64(),
            Err(e) => {
                warn!(target = %target.display(), "Frame rate detection failed, using {}: {}", DEFAULT_FPS, e);
                DEFAULT_FPS
            }
        }
    }

    async fn check_content(&self, target: &Path) -> WorkerResult<()> {
        let Some(classifier) = &self.classifier else {
            return Ok(());
        };
        if classifier.is_unsafe(target).await? {
            return Err(WorkerError::ContentRejected(target.to_path_buf()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_file, FakeCodec};
    use fswap_media::core::MockContentSafetyClassifier;
    use fswap_media::testing::{FakeInference, NO_FACE};
    use fswap_models::{FrameRate, JobOptions, ProgressEvent, StageName};
    use fswap_progress::ProgressChannel;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        fake: FakeInference,
        channel: ProgressChannel,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            tokio::fs::create_dir_all(dir.path().join("in")).await.unwrap();
            write_file(&dir.path().join("in"), "source.jpg", b"source").await;
            Self {
                dir,
                fake: FakeInference::new(),
                channel: ProgressChannel::new(),
            }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("in")
        }

        fn work_dir(&self) -> PathBuf {
            self.dir.path().join("work")
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn runner(&self, codec: &FakeCodec) -> JobRunner {
            JobRunner::new(
                Arc::new(codec.clone()),
                self.fake.handles(),
                PathPolicy::new(self.work_dir()),
            )
        }

        fn job(&self, targets: &[&str], options: JobOptions) -> Job {
            Job::new(
                self.input().join("source.jpg"),
                targets.iter().map(|t| self.input().join(t)).collect(),
                self.out_dir(),
            )
            .with_options(options)
        }

        async fn run(&self, runner: &JobRunner, job: &Job) -> WorkerResult<JobReport> {
            let (_tx, rx) = watch::channel(false);
            runner.run(job, &self.channel.sender(job.id.clone()), rx).await
        }

        fn events(&self) -> Vec<ProgressEvent> {
            let mut events = Vec::new();
            while let Some(event) = self.channel.try_recv() {
                events.push(event.event);
            }
            events
        }
    }

    fn progress_values(events: &[ProgressEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { progress } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_image_target_writes_output_directly() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "target.jpg", b"target").await;
        let codec = FakeCodec::new();
        let job = fx.job(&["target.jpg"], JobOptions::default());

        let report = fx.run(&fx.runner(&codec), &job).await.unwrap();

        let expected = fx.out_dir().join("source-target.png");
        assert_eq!(report.output_files(), vec![expected.clone()]);
        assert_eq!(tokio::fs::read(&expected).await.unwrap(), b"target|swap");
        let swaps: Vec<String> = fx
            .fake
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("swap"))
            .collect();
        assert_eq!(swaps, vec!["swap target.jpg faces=1"]);
        assert!(!fx.work_dir().join(job.id.as_str()).exists());

        let events = fx.events();
        assert_eq!(
            events.last().unwrap(),
            &ProgressEvent::complete(vec![expected.clone()], vec![])
        );
        assert!(events.contains(&ProgressEvent::target_done(job.target_paths[0].clone(), expected)));
        assert_eq!(progress_values(&events), vec![100.0]);
    }

    #[tokio::test]
    async fn test_video_defaults_to_30_fps_and_restores_audio() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "target.mp4", b"video").await;
        let codec = FakeCodec::new();
        let job = fx.job(&["target.mp4"], JobOptions::default());

        let report = fx.run(&fx.runner(&codec), &job).await.unwrap();

        let output = fx.out_dir().join("source-target.mp4");
        assert_eq!(report.output_files(), vec![output.clone()]);
        assert!(codec.calls().contains(&"assemble frames=10 fps=30".to_string()));

        let body = tokio::fs::read_to_string(&output).await.unwrap();
        assert!(body.starts_with("frame1|swap\n"));
        assert!(body.ends_with("+audio"));
        assert!(!fx.work_dir().join(job.id.as_str()).exists());
    }

    #[tokio::test]
    async fn test_keep_fps_uses_detected_rate_or_falls_back() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "clip.mp4", b"video").await;
        let options = JobOptions {
            keep_fps: true,
            keep_audio: false,
            ..Default::default()
        };

        let codec = FakeCodec {
            frame_rate: FrameRate::new(30000, 1001),
            ..FakeCodec::new()
        };
        fx.run(&fx.runner(&codec), &fx.job(&["clip.mp4"], options.clone()))
            .await
            .unwrap();
        let expected = format!("assemble frames=10 fps={}", 30000.0 / 1001.0);
        assert!(codec.calls().contains(&expected));

        let undetectable = FakeCodec {
            frame_rate: None,
            ..FakeCodec::new()
        };
        fx.run(&fx.runner(&undetectable), &fx.job(&["clip.mp4"], options))
            .await
            .unwrap();
        assert!(undetectable
            .calls()
            .contains(&"assemble frames=10 fps=30".to_string()));
    }

    #[tokio::test]
    async fn test_audio_restore_failure_degrades_to_silent_output() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "mute.mp4", b"video").await;
        let codec = FakeCodec {
            audio_fails: true,
            ..FakeCodec::new()
        };
        let job = fx.job(&["mute.mp4"], JobOptions::default());

        let report = fx.run(&fx.runner(&codec), &job).await.unwrap();

        let output = fx.out_dir().join("source-mute.mp4");
        match &report.outcomes[0] {
            TargetOutcome::Done { warnings, .. } => {
                assert_eq!(warnings.len(), 1);
                assert!(warnings[0].contains("Audio restore failed"));
            }
            other => panic!("expected done, got {:?}", other),
        }
        let body = tokio::fs::read_to_string(&output).await.unwrap();
        assert!(!body.contains("+audio"));

        let events = fx.events();
        let messages: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Message { message } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        let position = |text: &str| {
            messages
                .iter()
                .position(|m| m.contains(text))
                .unwrap_or_else(|| panic!("missing status {:?} in {:?}", text, messages))
        };
        let order = [
            position("Restoring audio might cause issues as fps are not kept..."),
            position("Extracting frames..."),
            position("Progressing with face_swapper..."),
            position("Creating video with 30 fps..."),
            position("has no audio track; output will be silent"),
            position("output has no audio"),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", messages);
        assert!(events.last().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_same_stem_targets_keep_separate_frames() {
        let fx = Fixture::new().await;
        tokio::fs::create_dir_all(fx.input().join("a")).await.unwrap();
        tokio::fs::create_dir_all(fx.input().join("b")).await.unwrap();
        write_file(&fx.input().join("a"), "clip.mp4", b"frames=20;long").await;
        write_file(&fx.input().join("b"), "clip.mp4", b"frames=5;short").await;
        let codec = FakeCodec::new();
        let job = fx.job(
            &["a/clip.mp4", "b/clip.mp4"],
            JobOptions {
                keep_frames: true,
                keep_audio: false,
                ..Default::default()
            },
        );

        let report = fx.run(&fx.runner(&codec), &job).await.unwrap();

        let outputs = report.output_files();
        assert_eq!(outputs.len(), 2);
        assert_ne!(outputs[0], outputs[1]);
        let assembled: Vec<String> = codec
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("assemble"))
            .collect();
        assert_eq!(
            assembled,
            vec!["assemble frames=20 fps=30", "assemble frames=5 fps=30"]
        );
        let second = tokio::fs::read_to_string(&outputs[1]).await.unwrap();
        assert_eq!(second.lines().count(), 5);

        let job_dir = fx.work_dir().join(job.id.as_str());
        assert!(job_dir.join("1-clip").join("0020.png").exists());
        assert!(job_dir.join("2-clip").join("0005.png").exists());
        assert!(!job_dir.join("2-clip").join("0006.png").exists());
    }

    #[tokio::test]
    async fn test_keep_frames_retains_workspace() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "keep.mp4", b"video").await;
        let codec = FakeCodec::new();
        let job = fx.job(
            &["keep.mp4"],
            JobOptions {
                keep_frames: true,
                ..Default::default()
            },
        );

        fx.run(&fx.runner(&codec), &job).await.unwrap();

        let frames_dir = fx.work_dir().join(job.id.as_str()).join("1-keep");
        assert!(frames_dir.join("0001.png").exists());
        assert!(frames_dir.join("0010.png").exists());
    }

    #[tokio::test]
    async fn test_failed_target_does_not_stop_job() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "broken.mp4", b"broken stream").await;
        write_file(&fx.input(), "notes.txt", b"hello").await;
        write_file(&fx.input(), "photo.png", b"photo").await;
        let codec = FakeCodec::new();
        let job = fx.job(&["broken.mp4", "notes.txt", "photo.png"], JobOptions::default());

        let report = fx.run(&fx.runner(&codec), &job).await.unwrap();

        assert_eq!(report.state, JobState::Completed);
        assert_eq!(report.output_files(), vec![fx.out_dir().join("source-photo.png")]);
        let kinds: Vec<&str> = report
            .outcomes
            .iter()
            .filter_map(|o| match o {
                TargetOutcome::Failed { kind, .. } => Some(kind.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["extraction_failed", "unsupported_media"]);
        assert!(!fx.work_dir().join(job.id.as_str()).exists());
        assert!(!fx.out_dir().join("source-broken.mp4").exists());

        let events = fx.events();
        let progress = progress_values(&events);
        assert_eq!(progress.len(), 3);
        assert!((progress[0] - 100.0 / 3.0).abs() < 1e-9);
        assert!((progress[1] - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(progress[2], 100.0);
        match events.last().unwrap() {
            ProgressEvent::Complete {
                output_files,
                failed_targets,
                ..
            } => {
                assert_eq!(output_files.len(), 1);
                assert_eq!(failed_targets.len(), 2);
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stage_order_is_preserved_for_images() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "portrait.png", b"p").await;
        let codec = FakeCodec::new();
        let job = fx.job(
            &["portrait.png"],
            JobOptions {
                stages: vec![StageName::FaceEnhancer, StageName::FaceSwapper],
                ..Default::default()
            },
        );

        fx.run(&fx.runner(&codec), &job).await.unwrap();

        let output = fx.out_dir().join("source-portrait.png");
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"p|enhance|swap");
    }

    #[tokio::test]
    async fn test_source_without_face_aborts_before_targets() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "source.jpg", NO_FACE).await;
        write_file(&fx.input(), "target.mp4", b"video").await;
        let codec = FakeCodec::new();
        let job = fx.job(&["target.mp4"], JobOptions::default());

        let err = fx.run(&fx.runner(&codec), &job).await.unwrap_err();

        assert!(matches!(err, WorkerError::StageNotReady(_)));
        assert!(codec.calls().is_empty());
        assert!(!fx.out_dir().exists());
        assert_eq!(
            fx.events().last().unwrap(),
            &ProgressEvent::complete(vec![], vec![])
        );
    }

    #[tokio::test]
    async fn test_unsafe_content_aborts_job_keeping_prior_outputs() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "ok.png", b"fine").await;
        write_file(&fx.input(), "bad.mp4", b"video").await;
        write_file(&fx.input(), "later.png", b"never").await;

        let mut classifier = MockContentSafetyClassifier::new();
        classifier
            .expect_is_unsafe()
            .returning(|path| Ok(path.ends_with("bad.mp4")));

        let codec = FakeCodec::new();
        let runner = fx.runner(&codec).with_classifier(Arc::new(classifier));
        let job = fx.job(&["ok.png", "bad.mp4", "later.png"], JobOptions::default());

        let err = fx.run(&runner, &job).await.unwrap_err();

        assert!(matches!(err, WorkerError::ContentRejected(_)));
        assert!(codec.calls().is_empty());
        assert!(!fx.work_dir().join(job.id.as_str()).exists());
        assert!(!fx.out_dir().join("source-later.png").exists());
        assert_eq!(
            fx.events().last().unwrap(),
            &ProgressEvent::complete(vec![fx.out_dir().join("source-ok.png")], vec![])
        );
    }

    #[tokio::test]
    async fn test_cancelled_job_emits_message_and_complete() {
        let fx = Fixture::new().await;
        write_file(&fx.input(), "target.png", b"t").await;
        let codec = FakeCodec::new();
        let job = fx.job(&["target.png"], JobOptions::default());

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let err = fx
            .runner(&codec)
            .run(&job, &fx.channel.sender(job.id.clone()), rx)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Cancelled));
        let events = fx.events();
        assert_eq!(
            events,
            vec![
                ProgressEvent::message("Processing cancelled"),
                ProgressEvent::complete(vec![], vec![]),
            ]
        );
    }
}
