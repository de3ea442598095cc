//! FFprobe source inspection.
//!
//! Probing is best-effort: a failed query degrades to a default. Only a
//! cancelled job stops a probe with an error.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::command::{run_tool, ToolOutput};
use crate::error::{MediaError, MediaResult};

/// Bitrate assumed when the source bitrate cannot be read.
pub const DEFAULT_BITRATE: u64 = 2_000_000;

const BITRATE_QUERY: [&str; 6] = [
    "-select_streams",
    "v:0",
    "-show_entries",
    "stream=bit_rate",
    "-of",
    "default=noprint_wrappers=1:nokey=1",
];
const AUDIO_QUERY: [&str; 6] = [
    "-select_streams",
    "a",
    "-show_entries",
    "stream=codec_type",
    "-of",
    "csv=p=0",
];

/// Properties of a source video needed to parameterize a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    /// Bitrate of the first video stream in bits/second
    pub bitrate: u64,
    /// Whether any audio stream is present
    pub has_audio: bool,
}

/// Read-only FFprobe queries.
///
/// Every query degrades to a default on failure. The one error surfaced is
/// [`MediaError::Cancelled`], when the cancel signal fires mid-query.
#[derive(Debug, Clone)]
pub struct Prober {
    binary: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober {
    pub fn new() -> Self {
        Self::with_binary("ffprobe")
    }

    /// Use a specific FFprobe binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cancel_rx: None,
        }
    }

    /// Kill a running query when `cancel_rx` turns `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run both probes.
    pub async fn probe(&self, path: impl AsRef<Path>) -> MediaResult<SourceInfo> {
        let path = path.as_ref();
        Ok(SourceInfo {
            bitrate: self.video_bitrate(path).await?,
            has_audio: self.has_audio(path).await?,
        })
    }

    /// Bitrate of the first video stream, or [`DEFAULT_BITRATE`].
    pub async fn video_bitrate(&self, path: impl AsRef<Path>) -> MediaResult<u64> {
        let bitrate = match self.query(&BITRATE_QUERY, path.as_ref()).await? {
            Some(output) if output.status.success() => match parse_bitrate(&output.stdout) {
                Some(bitrate) => bitrate,
                None => {
                    debug!("Unparseable bitrate {:?}, using default", output.stdout.trim());
                    DEFAULT_BITRATE
                }
            },
            Some(output) => {
                debug!(
                    "ffprobe bitrate query exited with {:?}, using default",
                    output.status.code()
                );
                DEFAULT_BITRATE
            }
            None => DEFAULT_BITRATE,
        };
        Ok(bitrate)
    }

    /// Whether the source has at least one audio stream.
    pub async fn has_audio(&self, path: impl AsRef<Path>) -> MediaResult<bool> {
        let found = match self.query(&AUDIO_QUERY, path.as_ref()).await? {
            Some(output) => output.status.success() && !output.stdout.trim().is_empty(),
            None => false,
        };
        Ok(found)
    }

    /// Run one query. `None` means ffprobe could not be run at all.
    async fn query(&self, query: &[&str], path: &Path) -> MediaResult<Option<ToolOutput>> {
        if self.cancel_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Err(MediaError::Cancelled);
        }

        let args = probe_args(query, path);
        match run_tool("ffprobe", &self.binary, &args, self.cancel_rx.clone(), None).await {
            Ok(output) => Ok(Some(output)),
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                warn!("ffprobe query failed, using default: {}", e);
                Ok(None)
            }
        }
    }
}

fn probe_args(query: &[&str], path: &Path) -> Vec<String> {
    let mut args = vec!["-v".to_string(), "error".to_string()];
    args.extend(query.iter().map(|s| s.to_string()));
    args.push(path.to_string_lossy().to_string());
    args
}

/// Parse bare `bit_rate` output.
pub fn parse_bitrate(stdout: &str) -> Option<u64> {
    stdout.trim().parse::<u64>().ok()
}
