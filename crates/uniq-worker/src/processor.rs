//! Media processor facade.
//!
//! Owns the queue and the worker task. Callers submit a file and wait for
//! its output; submissions are served strictly in arrival order by a single
//! worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use uniq_media::TransformRegistry;
use uniq_models::{MediaKind, ProcessingError, ProcessingResult};
use uniq_queue::{job_queue, JobQueue, MediaJob, NOT_RUNNING};

use crate::executor::{JobExecutor, DEFAULT_ABORT_GRACE};
use crate::metrics;

/// State that exists only while the processor runs.
struct ProcessorRuntime {
    queue: JobQueue,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl ProcessorRuntime {
    fn is_alive(&self) -> bool {
        !self.worker.is_finished() && !self.queue.is_closed()
    }
}

/// Serializing front door to the media transforms.
///
/// Construct once and share as `Arc<MediaProcessor>`.
pub struct MediaProcessor {
    capacity: usize,
    registry: Arc<TransformRegistry>,
    abort_grace: Duration,
    runtime: Mutex<Option<ProcessorRuntime>>,
}

impl MediaProcessor {
    /// Create a stopped processor with a queue of `capacity` jobs.
    pub fn new(capacity: usize, registry: TransformRegistry) -> Self {
        Self {
            capacity: capacity.max(1),
            registry: Arc::new(registry),
            abort_grace: DEFAULT_ABORT_GRACE,
            runtime: Mutex::new(None),
        }
    }

    /// How long `stop()` lets an in-flight transform ignore cancellation
    /// before dropping it.
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    /// Start the worker. No-op while already running.
    pub async fn start(&self) {
        let mut runtime = self.runtime.lock().await;
        if runtime.as_ref().is_some_and(ProcessorRuntime::is_alive) {
            debug!("Media processor already running");
            return;
        }

        let (queue, receiver) = job_queue(self.capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let executor = JobExecutor::new(Arc::clone(&self.registry), receiver, shutdown_rx)
            .with_abort_grace(self.abort_grace);
        let worker = tokio::spawn(executor.run());

        *runtime = Some(ProcessorRuntime { queue, shutdown, worker });
        metrics::set_queue_length(0);
        info!("Media processor started with queue capacity {}", self.capacity);
    }

    /// Stop the worker and cancel every pending job.
    ///
    /// Returns once the worker task has finished; no transform runs after
    /// this returns. No-op when not running.
    pub async fn stop(&self) {
        let Some(runtime) = self.runtime.lock().await.take() else {
            debug!("Media processor not running");
            return;
        };

        info!("Stopping media processor");
        // Fails only when the worker already exited
        let _ = runtime.shutdown.send(true);

        if let Err(e) = runtime.worker.await {
            error!("Media processor worker ended abnormally: {}", e);
        }
        info!("Media processor stopped");
    }

    /// Transform `source` into `destination_dir` and wait for the result.
    ///
    /// Suspends while the queue is full. Fails with `Cancelled` when the
    /// processor is not running or stops before the job completes.
    pub async fn submit(
        &self,
        kind: MediaKind,
        source: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> ProcessingResult<PathBuf> {
        let queue = self.queue().await?;
        let (job, handle) = MediaJob::new(kind, source, destination_dir);
        debug!(job_id = %job.id, kind = %kind, "Submitting job");

        queue.enqueue(job).await?;
        metrics::record_job_enqueued(kind.as_str());
        metrics::set_queue_length(queue.len());

        handle.wait().await
    }

    pub async fn submit_image(
        &self,
        source: impl AsRef<Path>,
        destination_dir: impl AsRef<Path>,
    ) -> ProcessingResult<PathBuf> {
        self.submit(MediaKind::Image, source.as_ref(), destination_dir.as_ref())
            .await
    }

    pub async fn submit_video(
        &self,
        source: impl AsRef<Path>,
        destination_dir: impl AsRef<Path>,
    ) -> ProcessingResult<PathBuf> {
        self.submit(MediaKind::Video, source.as_ref(), destination_dir.as_ref())
            .await
    }

    pub async fn is_running(&self) -> bool {
        self.runtime
            .lock()
            .await
            .as_ref()
            .is_some_and(ProcessorRuntime::is_alive)
    }

    /// Jobs waiting behind the one in flight.
    pub async fn queue_len(&self) -> usize {
        self.runtime
            .lock()
            .await
            .as_ref()
            .map_or(0, |runtime| runtime.queue.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn queue(&self) -> ProcessingResult<JobQueue> {
        self.runtime
            .lock()
            .await
            .as_ref()
            .map(|runtime| runtime.queue.clone())
            .ok_or_else(|| ProcessingError::cancelled(NOT_RUNNING))
    }
}
