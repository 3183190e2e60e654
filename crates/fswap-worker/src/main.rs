//! Headless face-swap worker binary.
//!
//! Runs one job from the command line and prints every progress record to
//! stdout as a JSON line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fswap_models::{
    suggest_execution_threads, suggest_max_memory, EncodingConfig, ExecutionProvider, Job,
    JobOptions, JobState, StageName,
};
use fswap_progress::{encode_event, ProgressChannel};
use fswap_worker::{build_executor, LastUsedStore, WorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "fswap-worker", version, about = "Swap a face onto images and videos")]
struct Cli {
    /// Image holding the face to apply
    #[arg(short = 's', long = "source")]
    source: Option<PathBuf>,

    /// Deprecated alias of --source
    #[arg(short = 'f', long = "face", hide = true)]
    face: Option<PathBuf>,

    /// Image or video to process (repeatable)
    #[arg(short = 't', long = "target")]
    targets: Vec<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Processor stages, applied in the given order
    #[arg(long = "frame-processor", num_args = 1.., default_value = "face_swapper")]
    frame_processors: Vec<StageName>,

    /// Keep the target's frame rate instead of 30 fps
    #[arg(long)]
    keep_fps: bool,

    /// Accepted for compatibility; audio is kept unless --no-keep-audio is given
    #[arg(long, hide = true)]
    keep_audio: bool,

    /// Drop the original audio track
    #[arg(long, conflicts_with = "keep_audio")]
    no_keep_audio: bool,

    /// Keep extracted frames after processing
    #[arg(long)]
    keep_frames: bool,

    /// Swap every detected face instead of the leftmost one
    #[arg(long)]
    many_faces: bool,

    /// Memory limit for the inference backend, in GB
    #[arg(long)]
    max_memory: Option<u32>,

    /// Execution providers, in preference order
    #[arg(long = "execution-provider", num_args = 1..)]
    execution_providers: Vec<ExecutionProvider>,

    /// Inference thread count
    #[arg(long)]
    execution_threads: Option<u32>,

    #[arg(
        long,
        default_value = "error",
        value_parser = ["debug", "info", "warning", "error", "critical"]
    )]
    log_level: String,
}

impl Cli {
    fn job_options(&self) -> JobOptions {
        let execution_providers = if self.execution_providers.is_empty() {
            vec![ExecutionProvider::Cpu]
        } else {
            self.execution_providers.clone()
        };
        JobOptions {
            stages: self.frame_processors.clone(),
            many_faces: self.many_faces,
            keep_fps: self.keep_fps,
            keep_audio: !self.no_keep_audio,
            keep_frames: self.keep_frames,
            max_memory: self.max_memory.unwrap_or_else(suggest_max_memory),
            execution_threads: self
                .execution_threads
                .unwrap_or_else(|| suggest_execution_threads(&execution_providers)),
            execution_providers,
        }
    }
}

fn tracing_level(level: &str) -> &'static str {
    match level {
        "debug" => "debug",
        "info" => "info",
        "warning" => "warn",
        _ => "error",
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("fswap={}", tracing_level(level)).parse()?);

    // stdout carries the progress records
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let mut config = WorkerConfig::from_env();
    config.encoding.log_level = EncodingConfig::ffmpeg_log_level(&cli.log_level).to_string();
    info!("Worker config: {:?}", config);

    let last_used = LastUsedStore::new(&config.last_used_paths_file);
    let remembered = last_used.load().await.unwrap_or_else(|e| {
        warn!("Failed to load last-used paths: {}", e);
        Default::default()
    });

    if cli.face.is_some() {
        warn!("-f/--face is deprecated, use -s/--source instead");
    }
    let source = cli
        .source
        .clone()
        .or_else(|| cli.face.clone())
        .or(remembered.source_path)
        .context("No source given (-s) and no last-used source found")?;
    let targets = if cli.targets.is_empty() {
        remembered.target_path.into_iter().collect()
    } else {
        cli.targets.clone()
    };
    if targets.is_empty() {
        bail!("No target given (-t) and no last-used target found");
    }
    let output_dir = cli.output.clone().unwrap_or_else(|| config.output_dir.clone());

    let options = cli.job_options();
    let progress = ProgressChannel::new();
    let executor =
        Arc::new(build_executor(config, progress.clone(), &options.execution_providers).await?);

    let job = Job::new(source, targets, output_dir).with_options(options);
    let ack = executor.submit(job).await?;
    println!("{}", serde_json::to_string(&ack)?);

    let job_id = ack.job_id.clone();
    let cancel_executor = Arc::clone(&executor);
    let cancel_id = job_id.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, cancelling job");
            cancel_executor.cancel(&cancel_id);
        }
    });

    while let Some(event) = progress.recv().await {
        println!("{}", encode_event(&event)?);
        if event.job_id == job_id && event.event.is_complete() {
            break;
        }
    }

    match executor.wait(&job_id).await {
        Some(JobState::Completed) => Ok(()),
        Some(state) => bail!("Job {} ended {}", job_id, state),
        None => bail!("Job {} disappeared", job_id),
    }
}
