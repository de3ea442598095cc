//! Media uniqueization worker.
//!
//! This crate provides:
//! - A processor facade with start/stop/submit
//! - The single job executor behind it
//! - Intake orchestration for inbound files
//! - Configuration, structured job logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use intake::{
    FileFetcher, IntakeOutcome, IntakeRequest, MediaIntake, RejectReason, ResultSink,
    SubscriptionGate, SubscriptionStatus,
};
pub use logging::{JobLogger, JobStatus};
pub use processor::MediaProcessor;
