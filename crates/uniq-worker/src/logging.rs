//! Structured job logging.
//!
//! Every line carries the job id, media kind and source path so a single
//! job can be followed through the worker.

use std::time::Duration;

use tracing::{debug, error, info, warn, Span};
use uniq_models::MediaKind;
use uniq_queue::{JobOutcome, MediaJob};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn of(outcome: &JobOutcome) -> Self {
        match outcome {
            Ok(_) => JobStatus::Completed,
            Err(e) if e.is_cancelled() => JobStatus::Cancelled,
            Err(_) => JobStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }
}

/// Logger for one queued job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: MediaKind,
    source: String,
}

impl JobLogger {
    pub fn for_job(job: &MediaJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            kind: job.kind,
            source: job.source_path.display().to_string(),
        }
    }

    pub fn log_start(&self, transform: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            source = %self.source,
            transform,
            "Job started"
        );
    }

    /// The submitter stopped waiting before the job was reached.
    pub fn log_skipped(&self) {
        debug!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            source = %self.source,
            "Job skipped: nobody is waiting for the result"
        );
    }

    /// Cancelled without ever running.
    pub fn log_cancelled(&self, reason: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            source = %self.source,
            reason,
            "Job cancelled"
        );
    }

    /// Log how a run ended and return its status.
    pub fn log_outcome(&self, outcome: &JobOutcome, elapsed: Duration) -> JobStatus {
        let status = JobStatus::of(outcome);
        let elapsed_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(output) => info!(
                job_id = %self.job_id,
                kind = self.kind.as_str(),
                source = %self.source,
                output = %output.display(),
                elapsed_ms,
                "Job completed"
            ),
            Err(e) if status == JobStatus::Cancelled => self.log_cancelled(&e.to_string()),
            Err(e) => error!(
                job_id = %self.job_id,
                kind = self.kind.as_str(),
                source = %self.source,
                elapsed_ms,
                "Job failed: {}", e
            ),
        }

        status
    }

    /// Result could not be handed back because the submitter is gone.
    pub fn log_unclaimed(&self, status: JobStatus) {
        warn!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            status = status.as_str(),
            "Job result dropped by its submitter"
        );
    }

    /// Span wrapping everything logged while the job runs.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            kind = self.kind.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use uniq_models::ProcessingError;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        captured.text()
    }

    fn logger(kind: MediaKind, source: &str) -> JobLogger {
        let (job, _handle) = MediaJob::new(kind, source, "out");
        JobLogger::for_job(&job)
    }

    #[test]
    fn test_status_of_outcome() {
        assert_eq!(JobStatus::of(&Ok(PathBuf::from("out.jpg"))), JobStatus::Completed);
        assert_eq!(
            JobStatus::of(&Err(ProcessingError::cancelled("processor stopped"))),
            JobStatus::Cancelled
        );
        assert_eq!(
            JobStatus::of(&Err(ProcessingError::external_tool("ffmpeg exited with 1"))),
            JobStatus::Failed
        );
        assert_eq!(JobStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_cancellation_is_not_logged_as_failure() {
        let logger = logger(MediaKind::Video, "clip.mp4");
        let outcome = Err(ProcessingError::cancelled("processor stopped"));

        let mut status = None;
        let text = capture(|| status = Some(logger.log_outcome(&outcome, Duration::ZERO)));

        assert_eq!(status, Some(JobStatus::Cancelled));
        assert!(text.contains("Job cancelled"), "{}", text);
        assert!(!text.contains("Job failed"), "{}", text);
        assert!(text.contains("kind=\"video\"") || text.contains("kind=video"), "{}", text);
        assert!(text.contains("source=clip.mp4"), "{}", text);
    }

    #[test]
    fn test_failure_carries_error_message() {
        let logger = logger(MediaKind::Image, "photo.jpg");
        let outcome = Err(ProcessingError::external_tool("ffmpeg exited with 1: boom"));

        let text = capture(|| {
            logger.log_outcome(&outcome, Duration::from_millis(40));
        });

        assert!(text.contains("Job failed"), "{}", text);
        assert!(text.contains("boom"), "{}", text);
        assert!(text.contains("elapsed_ms=40"), "{}", text);
    }
}
