//! Error types for media operations.

use thiserror::Error;
use uniq_models::ProcessingError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found in PATH")]
    ToolNotFound { tool: String },

    #[error("{message}")]
    ToolFailed {
        tool: String,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a tool-not-found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a failure for a tool that ran and exited non-zero.
    ///
    /// The diagnostic is the trimmed stderr, or stdout when stderr is empty.
    pub fn tool_failed(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        stderr: &str,
        stdout: &str,
    ) -> Self {
        let tool = tool.into();
        let diagnostic = match stderr.trim() {
            "" => stdout.trim(),
            err => err,
        };
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());

        Self::ToolFailed {
            message: format!("{} exited with {}: {}", tool, code, diagnostic),
            tool,
            exit_code,
        }
    }

    /// Create a failure for a tool that could not be started.
    pub fn spawn_failed(tool: impl Into<String>, err: &std::io::Error) -> Self {
        let tool = tool.into();
        Self::ToolFailed {
            message: format!("failed to start {}: {}", tool, err),
            tool,
            exit_code: None,
        }
    }
}

impl From<MediaError> for ProcessingError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => {
                ProcessingError::cancelled("processor stopped while job was running")
            }
            MediaError::Io(e) => ProcessingError::Io(e.to_string()),
            other => ProcessingError::ExternalTool(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failed_prefers_stderr() {
        let err = MediaError::tool_failed("ffmpeg", Some(1), "  bad input \n", "ignored");
        assert_eq!(err.to_string(), "ffmpeg exited with 1: bad input");
    }

    #[test]
    fn test_tool_failed_falls_back_to_stdout() {
        let err = MediaError::tool_failed("ffmpeg", Some(2), "", " from stdout ");
        assert_eq!(err.to_string(), "ffmpeg exited with 2: from stdout");
    }

    #[test]
    fn test_tool_failed_killed_by_signal() {
        let err = MediaError::tool_failed("ffmpeg", None, "killed", "");
        assert_eq!(err.to_string(), "ffmpeg exited with signal: killed");
    }

    #[test]
    fn test_into_processing_error() {
        let err: ProcessingError = MediaError::tool_failed("ffmpeg", Some(1), "boom", "").into();
        assert_eq!(err, ProcessingError::ExternalTool("ffmpeg exited with 1: boom".to_string()));

        let err: ProcessingError = MediaError::Cancelled.into();
        assert!(err.is_cancelled());
    }
}
