//! Prometheus metrics for the worker.
//!
//! The macros are no-ops until a recorder is installed, so library code and
//! tests record freely.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::metrics_failed(e.to_string()))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const QUEUE_LENGTH: &str = "uniq_queue_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "uniq_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "uniq_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "uniq_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "uniq_jobs_cancelled_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "uniq_ffmpeg_duration_seconds";
}

pub fn set_queue_length(length: usize) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

pub fn record_job_enqueued(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

pub fn record_job_completed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_cancelled(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_CANCELLED_TOTAL, &labels).increment(1);
}

/// Record time spent in one transform, tool run included.
pub fn record_ffmpeg_duration(kind: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}
