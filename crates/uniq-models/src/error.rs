//! Errors surfaced to callers of the media processor.

use thiserror::Error;

use crate::job::UnknownMediaKind;

/// Result type for a submitted job.
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Why a submitted job did not produce an output file.
///
/// Cloneable so a job's outcome can be both logged by the worker and
/// handed to the caller that is waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("External tool failed: {0}")]
    ExternalTool(String),

    #[error("Unsupported media kind: {0}")]
    UnsupportedKind(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl ProcessingError {
    pub fn external_tool(msg: impl Into<String>) -> Self {
        Self::ExternalTool(msg.into())
    }

    pub fn unsupported_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedKind(kind.into())
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Check if the job was cancelled by a processor shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessingError::Cancelled(_))
    }
}

impl From<UnknownMediaKind> for ProcessingError {
    fn from(err: UnknownMediaKind) -> Self {
        Self::UnsupportedKind(err.0)
    }
}

impl From<std::io::Error> for ProcessingError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessingError::external_tool("ffmpeg exited with 1: boom");
        assert_eq!(err.to_string(), "External tool failed: ffmpeg exited with 1: boom");
        assert!(!err.is_cancelled());
        assert!(ProcessingError::cancelled("processor stopped").is_cancelled());
    }

    #[test]
    fn test_unknown_kind_conversion() {
        let err: ProcessingError = UnknownMediaKind("audio".to_string()).into();
        assert_eq!(err, ProcessingError::UnsupportedKind("audio".to_string()));
    }
}
