//! Image uniqueization.
//!
//! Strips metadata, rotates by a small non-zero angle, crops the fill
//! border and injects light noise, producing a file that is visually the
//! same but differs at pixel level.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;
use uniq_models::MediaKind;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::fs_utils::{ensure_dir, remove_if_exists, source_extension, unique_output_path};
use crate::params::{ImageParams, ParamSource};
use crate::transform::{MediaTransform, ToolConfig, TransformRequest};

/// Lossless still codec.
pub const PNG_CODEC: &str = "png";
/// Lossy still codec, also the fallback.
pub const JPEG_CODEC: &str = "mjpeg";

/// Output codec for a lowercased extension.
pub fn image_codec(extension: &str) -> &'static str {
    match extension {
        ".png" => PNG_CODEC,
        ".jpg" | ".jpeg" => JPEG_CODEC,
        _ => JPEG_CODEC,
    }
}

/// Build the FFmpeg invocation for one image.
pub fn build_image_command(
    source: &Path,
    output: &Path,
    codec: &str,
    params: &ImageParams,
) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .strip_metadata()
        .video_filters(params.filters())
        .video_codec(codec)
}

/// FFmpeg-backed image transform.
pub struct ImageTransform {
    tools: ToolConfig,
    params: Arc<ParamSource>,
}

impl ImageTransform {
    pub fn new(tools: ToolConfig, params: Arc<ParamSource>) -> Self {
        Self { tools, params }
    }
}

#[async_trait]
impl MediaTransform for ImageTransform {
    fn name(&self) -> &'static str {
        "ffmpeg_image"
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    async fn transform(
        &self,
        request: &TransformRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        ensure_dir(&request.destination_dir).await?;

        let extension = source_extension(&request.source)
            .unwrap_or_else(|| MediaKind::Image.default_extension().to_string());
        let codec = image_codec(&extension);
        let params = self.params.image_params();
        let output = unique_output_path(&request.destination_dir, &extension);

        info!(
            source = %request.source.display(),
            rotation_deg = params.rotation_deg,
            noise_level = params.noise_level,
            codec,
            "Uniqueizing image"
        );

        let cmd = build_image_command(&request.source, &output, codec, &params);
        if let Err(e) = self.tools.runner(cancel).run(&cmd).await {
            remove_if_exists(&output).await;
            return Err(e);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use tempfile::TempDir;

    #[test]
    fn test_image_codec() {
        assert_eq!(image_codec(".png"), "png");
        assert_eq!(image_codec(".jpg"), "mjpeg");
        assert_eq!(image_codec(".jpeg"), "mjpeg");
        assert_eq!(image_codec(".webp"), "mjpeg");
    }

    #[test]
    fn test_build_image_command() {
        let params = ImageParams {
            rotation_deg: 0.2,
            noise_level: 1.5,
        };
        let cmd = build_image_command(Path::new("in.png"), Path::new("out/x.png"), "png", &params);

        assert_eq!(
            cmd.build_args(),
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "in.png",
                "-map_metadata",
                "-1",
                "-vf",
                "rotate=0.2*PI/180:fillcolor=white@0,crop=iw-2:ih-2,noise=alls=1.50:allf=t",
                "-c:v",
                "png",
                "out/x.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_tool_failure() {
        let dir = TempDir::new().unwrap();
        let tools = ToolConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..ToolConfig::default()
        };
        let transform = ImageTransform::new(tools, Arc::new(ParamSource::seeded(1)));
        let (_tx, rx) = watch::channel(false);

        let request = TransformRequest::new(dir.path().join("in.jpg"), dir.path().join("out"));
        let err = transform.transform(&request, rx).await.unwrap_err();

        assert!(matches!(err, MediaError::ToolFailed { .. }));
        // Destination is created up front; nothing is left inside it
        let leftovers = std::fs::read_dir(dir.path().join("out")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
