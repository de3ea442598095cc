//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Metrics setup failed: {0}")]
    MetricsFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn metrics_failed(msg: impl Into<String>) -> Self {
        Self::MetricsFailed(msg.into())
    }
}
