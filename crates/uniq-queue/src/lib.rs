//! In-process media job queue.
//!
//! This crate provides:
//! - Jobs carrying a single-assignment result channel
//! - A bounded FIFO with backpressure, close and drain

pub mod job;
pub mod queue;

pub use job::{JobOutcome, MediaJob, ResultHandle};
pub use queue::{job_queue, JobQueue, JobQueueReceiver, DEFAULT_CAPACITY, NOT_RUNNING};
pub use uniq_models::{ProcessingError, ProcessingResult};
