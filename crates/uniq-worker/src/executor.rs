//! Job executor.
//!
//! A single loop that takes jobs off the queue one at a time and runs the
//! transform registered for each job's kind. At most one transform (and so
//! one external process) is active at any moment.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use uniq_media::{remove_if_exists, TransformRegistry, TransformRequest};
use uniq_models::ProcessingError;
use uniq_queue::{JobOutcome, JobQueueReceiver, MediaJob};

use crate::logging::{JobLogger, JobStatus};
use crate::metrics;

/// How long an in-flight transform may keep running after shutdown is
/// signalled before it is dropped.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_secs(2);

const STOPPED_WHILE_QUEUED: &str = "processor stopped before job started";
const STOPPED_WHILE_RUNNING: &str = "processor stopped while job was running";

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    registry: Arc<TransformRegistry>,
    receiver: JobQueueReceiver,
    shutdown: watch::Receiver<bool>,
    abort_grace: Duration,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        registry: Arc<TransformRegistry>,
        receiver: JobQueueReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            receiver,
            shutdown,
            abort_grace: DEFAULT_ABORT_GRACE,
        }
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    /// Run until shutdown is signalled or every producer is gone.
    ///
    /// On exit the queue is closed and every job still in it is resolved as
    /// cancelled.
    pub async fn run(mut self) {
        info!("Starting job executor with transforms {:?}", self.registry);
        let mut shutdown = self.shutdown.clone();

        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => {
                    info!("Shutdown signal received, stopping executor");
                    break;
                }
                job = self.receiver.dequeue() => match job {
                    Some(job) => job,
                    None => {
                        debug!("Queue closed, stopping executor");
                        break;
                    }
                },
            };

            metrics::set_queue_length(self.receiver.len());
            self.execute_job(job).await;
        }

        self.cancel_remaining();
        info!("Job executor stopped");
    }

    /// Run one job and resolve it. Never fails and never panics.
    async fn execute_job(&self, job: MediaJob) {
        let kind = job.kind.as_str();
        let logger = JobLogger::for_job(&job);

        if !job.is_awaited() {
            logger.log_skipped();
            metrics::record_job_cancelled(kind);
            return;
        }

        let started = Instant::now();
        let outcome = self
            .run_transform(&job, &logger)
            .instrument(logger.create_span())
            .await;

        let status = logger.log_outcome(&outcome, started.elapsed());
        match status {
            JobStatus::Completed => metrics::record_job_completed(kind),
            JobStatus::Cancelled => metrics::record_job_cancelled(kind),
            JobStatus::Failed => metrics::record_job_failed(kind),
        }

        let output = outcome.as_ref().ok().cloned();
        if !job.resolve(outcome) {
            logger.log_unclaimed(status);
            if let Some(path) = output {
                remove_if_exists(&path).await;
            }
        }
    }

    async fn run_transform(&self, job: &MediaJob, logger: &JobLogger) -> JobOutcome {
        let Some(transform) = self.registry.get(job.kind) else {
            return Err(ProcessingError::unsupported_kind(job.kind.as_str()));
        };

        logger.log_start(transform.name());

        let request = TransformRequest::new(&job.source_path, &job.destination_dir);
        let started = Instant::now();

        let transform_fut =
            AssertUnwindSafe(transform.transform(&request, self.shutdown.clone())).catch_unwind();
        let outcome = tokio::select! {
            result = transform_fut => match result {
                Ok(Ok(path)) => Ok(path),
                Ok(Err(e)) => Err(ProcessingError::from(e)),
                Err(panic) => Err(ProcessingError::Panicked(panic_message(panic))),
            },
            _ = abort_after_shutdown(self.shutdown.clone(), self.abort_grace) => {
                warn!("Transform ignored shutdown for {:?}, aborting", self.abort_grace);
                Err(ProcessingError::cancelled(STOPPED_WHILE_RUNNING))
            }
        };

        metrics::record_ffmpeg_duration(job.kind.as_str(), started.elapsed().as_secs_f64());
        outcome
    }

    fn cancel_remaining(&mut self) {
        let remaining = self.receiver.drain();
        if !remaining.is_empty() {
            info!("Cancelling {} queued jobs", remaining.len());
        }
        for job in remaining {
            JobLogger::for_job(&job).log_cancelled(STOPPED_WHILE_QUEUED);
            metrics::record_job_cancelled(job.kind.as_str());
            job.cancel(STOPPED_WHILE_QUEUED);
        }
        metrics::set_queue_length(0);
    }
}

/// Resolves once shutdown is requested or the signal's sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn abort_after_shutdown(mut shutdown: watch::Receiver<bool>, grace: Duration) {
    shutdown_signalled(&mut shutdown).await;
    tokio::time::sleep(grace).await;
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "transform panicked".to_string()
    }
}
