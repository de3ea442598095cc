//! Bounded FIFO between submitters and the worker.
//!
//! Backed by a bounded `tokio::sync::mpsc` channel: producers suspend while
//! the queue is full and are admitted in arrival order once a slot frees.

use tokio::sync::mpsc;
use tracing::debug;
use uniq_models::ProcessingError;

use crate::job::MediaJob;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 3;

/// Message given to jobs refused or dropped by a closed queue.
pub const NOT_RUNNING: &str = "processor is not running";

/// Create a queue holding at most `capacity` jobs (minimum 1).
pub fn job_queue(capacity: usize) -> (JobQueue, JobQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, JobQueueReceiver { rx })
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<MediaJob>,
}

impl JobQueue {
    /// Append a job, suspending while the queue is full.
    ///
    /// When the queue is closed the job is resolved as cancelled and the
    /// same error is returned.
    pub async fn enqueue(&self, job: MediaJob) -> Result<(), ProcessingError> {
        match self.tx.send(job).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(job)) => {
                debug!(job_id = %job.id, "Queue closed, refusing job");
                job.cancel(NOT_RUNNING);
                Err(ProcessingError::cancelled(NOT_RUNNING))
            }
        }
    }

    /// Jobs currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting jobs.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue, owned by the worker.
#[derive(Debug)]
pub struct JobQueueReceiver {
    rx: mpsc::Receiver<MediaJob>,
}

impl JobQueueReceiver {
    /// Take the oldest job, suspending while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn dequeue(&mut self) -> Option<MediaJob> {
        self.rx.recv().await
    }

    /// Jobs currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stop admitting jobs. Producers suspended in `enqueue` are released
    /// with a cancellation error.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Close the queue and take every job still waiting, oldest first.
    pub fn drain(&mut self) -> Vec<MediaJob> {
        self.rx.close();
        let mut jobs = Vec::new();
        while let Ok(job) = self.rx.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}
