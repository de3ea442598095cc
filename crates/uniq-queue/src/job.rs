//! Job types for the queue.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uniq_models::{JobId, MediaKind, ProcessingError};

/// Final result of one job: the output file or why there is none.
pub type JobOutcome = Result<PathBuf, ProcessingError>;

/// One unit of work: transform `source_path` into `destination_dir`.
///
/// The job owns the sending half of its result channel, so whoever holds the
/// job (the queue, then the worker) is the only party able to resolve it.
#[derive(Debug)]
pub struct MediaJob {
    /// Unique job ID, for log correlation
    pub id: JobId,
    /// Which transform applies
    pub kind: MediaKind,
    /// File to transform
    pub source_path: PathBuf,
    /// Directory that receives the output
    pub destination_dir: PathBuf,
    /// When the job was created
    pub submitted_at: DateTime<Utc>,
    resolver: oneshot::Sender<JobOutcome>,
}

impl MediaJob {
    /// Create a job and the handle its submitter waits on.
    pub fn new(
        kind: MediaKind,
        source_path: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> (Self, ResultHandle) {
        let (tx, rx) = oneshot::channel();
        let id = JobId::new();
        let handle = ResultHandle { id: id.clone(), rx };
        let job = Self {
            id,
            kind,
            source_path: source_path.into(),
            destination_dir: destination_dir.into(),
            submitted_at: Utc::now(),
            resolver: tx,
        };
        (job, handle)
    }

    /// Resolve the job, consuming it.
    ///
    /// Returns `false` when the submitter stopped waiting; the outcome is
    /// then discarded.
    pub fn resolve(self, outcome: JobOutcome) -> bool {
        self.resolver.send(outcome).is_ok()
    }

    /// Resolve the job as cancelled.
    pub fn cancel(self, reason: impl Into<String>) -> bool {
        self.resolve(Err(ProcessingError::cancelled(reason)))
    }

    /// Whether the submitter is still waiting for the outcome.
    pub fn is_awaited(&self) -> bool {
        !self.resolver.is_closed()
    }
}

/// Receiving half of a job's result.
///
/// Resolves exactly once. A job dropped without being resolved surfaces as
/// [`ProcessingError::Cancelled`], so waiting never hangs.
#[derive(Debug)]
pub struct ResultHandle {
    id: JobId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl ResultHandle {
    /// ID of the job this handle belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.id
    }

    /// Wait for the job's outcome.
    pub async fn wait(self) -> JobOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProcessingError::cancelled("job dropped before completion")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_output() {
        let (job, handle) = MediaJob::new(MediaKind::Image, "in.jpg", "out");
        assert_eq!(handle.job_id(), &job.id);
        assert_eq!(job.source_path, PathBuf::from("in.jpg"));

        assert!(job.resolve(Ok(PathBuf::from("out/x.jpg"))));
        assert_eq!(handle.wait().await, Ok(PathBuf::from("out/x.jpg")));
    }

    #[tokio::test]
    async fn test_resolve_delivers_error() {
        let (job, handle) = MediaJob::new(MediaKind::Video, "in.mp4", "out");
        job.resolve(Err(ProcessingError::external_tool("ffmpeg exited with 1: boom")));

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err, ProcessingError::external_tool("ffmpeg exited with 1: boom"));
    }

    #[tokio::test]
    async fn test_dropped_job_is_cancelled() {
        let (job, handle) = MediaJob::new(MediaKind::Image, "in.jpg", "out");
        drop(job);

        assert!(handle.wait().await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_resolve_after_handle_dropped() {
        let (job, handle) = MediaJob::new(MediaKind::Image, "in.jpg", "out");
        assert!(job.is_awaited());
        drop(handle);

        assert!(!job.is_awaited());
        assert!(!job.cancel("stopped"));
    }
}
