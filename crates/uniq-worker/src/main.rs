//! Media uniqueization worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uniq_media::{check_ffmpeg, check_ffprobe, ParamSource, TransformRegistry};
use uniq_worker::{metrics, MediaProcessor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("uniq=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting uniq-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Prometheus metrics listening on {}", addr),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    match check_ffmpeg(&config.ffmpeg_path) {
        Ok(path) => info!("Using ffmpeg at {}", path.display()),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
    // Probing degrades to defaults, so a missing ffprobe is survivable
    if let Err(e) = check_ffprobe(&config.ffprobe_path) {
        warn!("{}; video bitrate and audio detection will use defaults", e);
    }

    if let Err(e) = config.ensure_dirs().await {
        error!("Failed to create working directories: {}", e);
        std::process::exit(1);
    }

    let params = Arc::new(ParamSource::default());
    let registry = TransformRegistry::ffmpeg(config.tool_config(), params);
    let processor = Arc::new(MediaProcessor::new(config.queue_capacity, registry));
    processor.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    if tokio::time::timeout(config.shutdown_timeout, processor.stop())
        .await
        .is_err()
    {
        warn!(
            "Processor did not stop within {} seconds",
            config.shutdown_timeout.as_secs()
        );
    }

    info!("Worker shutdown complete");
}
