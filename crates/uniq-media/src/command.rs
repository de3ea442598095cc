//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// FFmpeg reports only errors, which end up in `ToolFailed` messages.
const LOG_LEVEL: &str = "error";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Drop all global and stream metadata from the output.
    pub fn strip_metadata(self) -> Self {
        self.output_arg("-map_metadata").output_arg("-1")
    }

    /// Set the video filter chain. Order is significant.
    pub fn video_filters<I, S>(self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chain: Vec<String> = filters.into_iter().map(Into::into).collect();
        self.output_arg("-vf").output_arg(chain.join(","))
    }

    /// Set audio filter.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set video bitrate in bits/second.
    pub fn video_bitrate(self, bits_per_sec: u64) -> Self {
        self.output_arg("-b:v").output_arg(bits_per_sec.to_string())
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Drop every audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Build the command arguments. The output is always overwritten.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            LOG_LEVEL.to_string(),
        ];

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        // Output file is always last
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured result of an external tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runner for FFmpeg commands with cancellation and timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// FFmpeg binary
    binary: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Use a specific FFmpeg binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        if self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(MediaError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary.display(), args.join(" "));

        let output = run_tool(
            "ffmpeg",
            &self.binary,
            &args,
            self.cancel_rx.clone(),
            self.timeout_secs.map(Duration::from_secs),
        )
        .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::tool_failed(
                "ffmpeg",
                output.status.code(),
                &output.stderr,
                &output.stdout,
            ))
        }
    }
}

/// Run an external tool to completion, capturing stdout and stderr.
///
/// The child is killed if `cancel_rx` flips to `true` or the timeout
/// elapses before it exits. A tool that cannot be started is reported as
/// `ToolFailed` under the `tool` label.
pub async fn run_tool(
    tool: &str,
    program: &Path,
    args: &[String],
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
) -> MediaResult<ToolOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::spawn_failed(tool, &e))?;

    // Drain both pipes concurrently so a chatty tool cannot block on a full pipe
    let stdout_task = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut err| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf).await;
            buf
        })
    });

    let status = match wait_for_exit(tool, &mut child, cancel_rx, timeout).await {
        Ok(status) => status,
        Err(e) => {
            for task in [&stdout_task, &stderr_task].into_iter().flatten() {
                task.abort();
            }
            return Err(e);
        }
    };

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    Ok(ToolOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Wait for child process with cancellation and timeout.
async fn wait_for_exit(
    tool: &str,
    child: &mut Child,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
) -> MediaResult<ExitStatus> {
    let cancelled = async move {
        match cancel_rx {
            Some(mut rx) => {
                let signalled = rx.wait_for(|cancel| *cancel).await.is_ok();
                if !signalled {
                    // Sender gone without cancelling: never fire
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => Ok(status?),
        _ = cancelled => {
            info!("{} cancelled, killing process", tool);
            let _ = child.kill().await;
            Err(MediaError::Cancelled)
        }
        _ = deadline => {
            let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!("{} timed out after {} seconds, killing process", tool, secs);
            let _ = child.kill().await;
            Err(MediaError::Timeout(secs))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    which::which(binary.as_ref()).map_err(|_| MediaError::tool_not_found("ffmpeg"))
}

/// Check if FFprobe is available.
pub fn check_ffprobe(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    which::which(binary.as_ref()).map_err(|_| MediaError::tool_not_found("ffprobe"))
}
