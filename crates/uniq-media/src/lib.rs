#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for media uniqueization.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Process execution with cancellation and timeout
//! - Best-effort FFprobe inspection
//! - Image and video transforms behind a registry keyed by media kind

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod image;
pub mod params;
pub mod probe;
pub mod transform;
pub mod video;

#[cfg(all(test, unix))]
mod test_support;

pub use command::{check_ffmpeg, check_ffprobe, run_tool, FfmpegCommand, FfmpegRunner, ToolOutput};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{remove_if_exists, source_extension, unique_output_path};
pub use image::{build_image_command, ImageTransform};
pub use params::{ImageParams, ParamSource, VideoParams};
pub use probe::{Prober, SourceInfo, DEFAULT_BITRATE};
pub use transform::{MediaTransform, ToolConfig, TransformRegistry, TransformRequest};
pub use video::{build_video_command, VideoTransform};
