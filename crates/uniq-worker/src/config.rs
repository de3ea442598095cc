//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use uniq_media::ToolConfig;
use uniq_queue::DEFAULT_CAPACITY;

use crate::error::WorkerResult;

/// Default intake limit for videos: 50 MiB.
pub const DEFAULT_MAX_VIDEO_BYTES: u64 = 50 * 1024 * 1024;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs the queue holds before submitters wait
    pub queue_capacity: usize,
    /// Directory for inbound media
    pub temp_dir: PathBuf,
    /// Directory for transform outputs
    pub processed_dir: PathBuf,
    /// FFmpeg binary
    pub ffmpeg_path: PathBuf,
    /// FFprobe binary
    pub ffprobe_path: PathBuf,
    /// Largest video accepted by intake
    pub max_video_bytes: u64,
    /// Per-process limit for a single FFmpeg run
    pub job_timeout: Option<Duration>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus exporter bind address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let temp_dir = PathBuf::from("./data/tmp");
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            processed_dir: temp_dir.join("processed"),
            temp_dir,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            max_video_bytes: DEFAULT_MAX_VIDEO_BYTES,
            job_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let temp_dir = std::env::var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/tmp"));

        Self {
            queue_capacity: std::env::var("QUEUE_MAXSIZE")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(DEFAULT_CAPACITY)
                .max(1),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| temp_dir.join("processed")),
            temp_dir,
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            max_video_bytes: std::env::var("MAX_VIDEO_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_VIDEO_BYTES),
            job_timeout: parse_job_timeout(std::env::var("JOB_TIMEOUT_SECS").ok().as_deref()),
            shutdown_timeout: Duration::from_secs(
                std::env::var("SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Tool locations and limits for the FFmpeg transforms.
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            ffmpeg: self.ffmpeg_path.clone(),
            ffprobe: self.ffprobe_path.clone(),
            timeout_secs: self.job_timeout.map(|t| t.as_secs()).filter(|secs| *secs > 0),
        }
    }

    /// Create the temp and processed directories.
    pub async fn ensure_dirs(&self) -> WorkerResult<()> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        tokio::fs::create_dir_all(&self.processed_dir).await?;
        Ok(())
    }
}

/// Whole seconds; zero or garbage means no limit.
fn parse_job_timeout(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
