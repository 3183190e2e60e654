//! Unbounded, ordered progress channel.

use futures_util::Stream;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use fswap_models::{FailedTarget, JobEvent, JobId, ProgressEvent};

use crate::error::{ProgressError, ProgressResult};

/// Process-wide progress stream.
///
/// Producers never block and events are never dropped. Consumers share one
/// receiver: each event goes to exactly one consumer, in publish order, and
/// `recv` waits without polling until an event is available.
#[derive(Clone)]
pub struct ProgressChannel {
    tx: mpsc::UnboundedSender<JobEvent>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<JobEvent>>>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Publishing handle for one job.
    pub fn sender(&self, job_id: JobId) -> ProgressSender {
        ProgressSender {
            job_id,
            tx: self.tx.clone(),
        }
    }

    /// Publish a pre-built event.
    pub fn publish(&self, event: JobEvent) -> ProgressResult<()> {
        self.tx.send(event).map_err(|_| ProgressError::Closed)
    }

    /// Wait for the next event.
    ///
    /// Returns `None` only once every sender, including this channel, is gone.
    pub async fn recv(&self) -> Option<JobEvent> {
        self.rx.lock().await.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&self) -> Option<JobEvent> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Drain the channel as a stream.
    pub fn stream(&self) -> impl Stream<Item = JobEvent> + Send + 'static {
        let rx = Arc::clone(&self.rx);
        futures_util::stream::unfold(rx, |rx| async move {
            let event = rx.lock().await.recv().await;
            event.map(|event| (event, rx))
        })
    }
}

/// Per-job publishing handle.
#[derive(Clone)]
pub struct ProgressSender {
    job_id: JobId,
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ProgressSender {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn send(&self, event: ProgressEvent) -> ProgressResult<()> {
        debug!(job_id = %self.job_id, ?event, "Publishing progress event");
        self.tx
            .send(JobEvent::new(self.job_id.clone(), event))
            .map_err(|_| ProgressError::Closed)
    }

    /// Job progress, 0-100.
    pub fn progress(&self, value: f64) -> ProgressResult<()> {
        self.send(ProgressEvent::progress(value))
    }

    /// Status text; also logged.
    pub fn message(&self, text: impl Into<String>) -> ProgressResult<()> {
        let text = text.into();
        info!(job_id = %self.job_id, "{}", text);
        self.send(ProgressEvent::message(text))
    }

    pub fn target_done(&self, target: impl Into<PathBuf>, output: impl Into<PathBuf>) -> ProgressResult<()> {
        self.send(ProgressEvent::target_done(target, output))
    }

    pub fn target_failed(&self, target: impl Into<PathBuf>, error: impl Into<String>) -> ProgressResult<()> {
        self.send(ProgressEvent::target_failed(target, error))
    }

    pub fn complete(&self, output_files: Vec<PathBuf>, failed_targets: Vec<FailedTarget>) -> ProgressResult<()> {
        self.send(ProgressEvent::complete(output_files, failed_targets))
    }
}

/// Serialize an event to a single JSON line.
pub fn encode_event(event: &JobEvent) -> ProgressResult<String> {
    Ok(serde_json::to_string(event)?)
}
