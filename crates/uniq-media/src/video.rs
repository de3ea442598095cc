//! Video uniqueization.
//!
//! Strips metadata, retimes by a speed factor close to 1, nudges gamma and
//! re-encodes at a jittered bitrate derived from the probed source bitrate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;
use uniq_models::MediaKind;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::fs_utils::{ensure_dir, remove_if_exists, source_extension, unique_output_path};
use crate::params::{ParamSource, VideoParams};
use crate::transform::{MediaTransform, ToolConfig, TransformRequest};

/// Containers the output may keep; anything else becomes `.mp4`.
pub const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".mkv"];
/// Video codec.
pub const VIDEO_CODEC: &str = "libx264";
/// Encoder preset.
pub const VIDEO_PRESET: &str = "medium";
/// Audio codec.
pub const AUDIO_CODEC: &str = "aac";
/// Audio bitrate, independent of the video bitrate.
pub const AUDIO_BITRATE: &str = "192k";

/// Output extension for a source path.
pub fn video_extension(source: &Path) -> String {
    match source_extension(source) {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => ext,
        _ => MediaKind::Video.default_extension().to_string(),
    }
}

/// Build the FFmpeg invocation for one video.
///
/// With audio the track is re-encoded and retimed by the same factor as
/// the video; without audio the output carries no audio stream at all.
pub fn build_video_command(
    source: &Path,
    output: &Path,
    params: &VideoParams,
    target_bitrate: u64,
    has_audio: bool,
) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(source, output)
        .strip_metadata()
        .video_filters(params.filters())
        .video_codec(VIDEO_CODEC)
        .preset(VIDEO_PRESET)
        .video_bitrate(target_bitrate)
        .faststart();

    if has_audio {
        cmd.audio_codec(AUDIO_CODEC)
            .audio_bitrate(AUDIO_BITRATE)
            .audio_filter(params.audio_filter())
    } else {
        cmd.no_audio()
    }
}

/// FFmpeg-backed video transform.
pub struct VideoTransform {
    tools: ToolConfig,
    params: Arc<ParamSource>,
}

impl VideoTransform {
    pub fn new(tools: ToolConfig, params: Arc<ParamSource>) -> Self {
        Self { tools, params }
    }

    /// Probe the source and build the command, without running it.
    ///
    /// Fails only when `cancel` fires during probing; probe failures fall
    /// back to the default bitrate and no audio.
    pub async fn plan(
        &self,
        request: &TransformRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<(PathBuf, FfmpegCommand)> {
        let extension = video_extension(&request.source);
        let output = unique_output_path(&request.destination_dir, &extension);

        let source_info = self.tools.prober(cancel).probe(&request.source).await?;
        let params = self.params.video_params();
        let target_bitrate = params.target_bitrate(source_info.bitrate);

        info!(
            source = %request.source.display(),
            source_bitrate = source_info.bitrate,
            target_bitrate,
            speed_factor = params.speed_factor,
            gamma_shift = params.gamma_shift,
            has_audio = source_info.has_audio,
            "Uniqueizing video"
        );

        let cmd = build_video_command(
            &request.source,
            &output,
            &params,
            target_bitrate,
            source_info.has_audio,
        );
        Ok((output, cmd))
    }
}

#[async_trait]
impl MediaTransform for VideoTransform {
    fn name(&self) -> &'static str {
        "ffmpeg_video"
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    async fn transform(
        &self,
        request: &TransformRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<PathBuf> {
        ensure_dir(&request.destination_dir).await?;

        let (output, cmd) = self.plan(request, cancel.clone()).await?;
        if let Err(e) = self.tools.runner(cancel).run(&cmd).await {
            remove_if_exists(&output).await;
            return Err(e);
        }

        Ok(output)
    }
}
