//! Transform interface and registry.
//!
//! The worker looks up a [`MediaTransform`] by media kind. Production code
//! registers the FFmpeg image and video transforms; tests register fakes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use uniq_models::MediaKind;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::image::ImageTransform;
use crate::params::ParamSource;
use crate::probe::Prober;
use crate::video::VideoTransform;

/// External tool locations and limits shared by the FFmpeg transforms.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// FFmpeg binary
    pub ffmpeg: PathBuf,
    /// FFprobe binary
    pub ffprobe: PathBuf,
    /// Kill a transform process running longer than this
    pub timeout_secs: Option<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout_secs: None,
        }
    }
}

impl ToolConfig {
    /// Runner bound to a job's cancellation signal.
    pub fn runner(&self, cancel: watch::Receiver<bool>) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_binary(&self.ffmpeg)
            .with_cancel(cancel)
            .with_timeout(self.timeout_secs)
    }

    /// Prober bound to a job's cancellation signal.
    pub fn prober(&self, cancel: watch::Receiver<bool>) -> Prober {
        Prober::with_binary(&self.ffprobe).with_cancel(cancel)
    }
}

/// Input of a single transform.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// File to read
    pub source: PathBuf,
    /// Directory that receives the new file
    pub destination_dir: PathBuf,
}

impl TransformRequest {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination_dir: destination_dir.into(),
        }
    }
}

/// A media transform producing a new file from a source file.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Get the name of this transform for logging.
    fn name(&self) -> &'static str;

    /// Media kind this transform handles.
    fn kind(&self) -> MediaKind;

    /// Produce the output file and return its path.
    ///
    /// Implementations must stop their external process when `cancel`
    /// turns `true` and report [`crate::MediaError::Cancelled`].
    async fn transform(
        &self,
        request: &TransformRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<PathBuf>;
}

/// Transforms keyed by media kind.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: Vec<Arc<dyn MediaTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the FFmpeg image and video transforms.
    pub fn ffmpeg(tools: ToolConfig, params: Arc<ParamSource>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImageTransform::new(tools.clone(), Arc::clone(&params))));
        registry.register(Arc::new(VideoTransform::new(tools, params)));
        registry
    }

    /// Register a transform. A later registration for the same kind wins.
    pub fn register(&mut self, transform: Arc<dyn MediaTransform>) {
        self.transforms.retain(|t| t.kind() != transform.kind());
        self.transforms.push(transform);
    }

    /// Get the transform for a kind.
    pub fn get(&self, kind: MediaKind) -> Option<Arc<dyn MediaTransform>> {
        self.transforms.iter().find(|t| t.kind() == kind).cloned()
    }

    /// Kinds with a registered transform.
    pub fn kinds(&self) -> Vec<MediaKind> {
        self.transforms.iter().map(|t| t.kind()).collect()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|t| t.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, MediaKind);

    #[async_trait]
    impl MediaTransform for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn kind(&self) -> MediaKind {
            self.1
        }

        async fn transform(
            &self,
            request: &TransformRequest,
            _cancel: watch::Receiver<bool>,
        ) -> MediaResult<PathBuf> {
            Ok(request.source.clone())
        }
    }

    #[test]
    fn test_ffmpeg_registry_covers_both_kinds() {
        let registry =
            TransformRegistry::ffmpeg(ToolConfig::default(), Arc::new(ParamSource::seeded(1)));

        assert_eq!(registry.get(MediaKind::Image).unwrap().name(), "ffmpeg_image");
        assert_eq!(registry.get(MediaKind::Video).unwrap().name(), "ffmpeg_video");
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let mut registry = TransformRegistry::new();
        registry.register(Arc::new(Named("first", MediaKind::Image)));
        registry.register(Arc::new(Named("second", MediaKind::Image)));

        assert_eq!(registry.kinds(), vec![MediaKind::Image]);
        assert_eq!(registry.get(MediaKind::Image).unwrap().name(), "second");
        assert!(registry.get(MediaKind::Video).is_none());
    }
}
