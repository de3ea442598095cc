use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use uniq_media::{check_ffmpeg, check_ffprobe, run_tool, ParamSource, TransformRegistry};
use uniq_worker::{MediaProcessor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "uniq-selfcheck: starting with temp_dir={} processed_dir={}",
        config.temp_dir.display(),
        config.processed_dir.display()
    );
    config.ensure_dirs().await?;

    let ffmpeg = check_ffmpeg(&config.ffmpeg_path)?;
    let ffprobe = check_ffprobe(&config.ffprobe_path)?;
    println!("uniq-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    roundtrip_image(&config).await?;

    println!("uniq-selfcheck: ok");
    Ok(())
}

/// Push a generated image through a real processor.
async fn roundtrip_image(config: &WorkerConfig) -> anyhow::Result<()> {
    let scratch = TempDir::new_in(&config.temp_dir)?;
    let source = scratch.path().join("selfcheck.png");
    generate_image(&config.ffmpeg_path, &source).await?;

    let params = Arc::new(ParamSource::default());
    let registry = TransformRegistry::ffmpeg(config.tool_config(), params);
    let processor = MediaProcessor::new(1, registry);
    processor.start().await;
    let result = processor.submit_image(&source, scratch.path()).await;
    processor.stop().await;

    let output = result.map_err(|e| anyhow::anyhow!("image transform failed: {}", e))?;
    let size = tokio::fs::metadata(&output).await?.len();
    if size == 0 {
        return Err(anyhow::anyhow!("image transform produced an empty file"));
    }
    println!("uniq-selfcheck: image transform ok ({} bytes)", size);
    Ok(())
}

async fn generate_image(ffmpeg: &Path, destination: &Path) -> anyhow::Result<()> {
    let args: Vec<String> = [
        "-y", "-loglevel", "error", "-f", "lavfi", "-i", "color=c=gray:s=32x32", "-frames:v", "1",
    ]
    .iter()
    .map(|a| a.to_string())
    .chain(std::iter::once(destination.to_string_lossy().into_owned()))
    .collect();

    let output = run_tool("ffmpeg", ffmpeg, &args, None, None).await?;
    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg test source failed: {}", output.stderr.trim()));
    }
    Ok(())
}
