//! Shared data models for the media uniqueizer.
//!
//! This crate provides:
//! - Media kinds accepted by the processing queue
//! - Job identifiers used for log correlation
//! - The error taxonomy surfaced to callers of the processor

pub mod error;
pub mod job;

// Re-export common types
pub use error::{ProcessingError, ProcessingResult};
pub use job::{JobId, MediaKind, UnknownMediaKind};
