//! Core domain types for the Conveyor pipeline scheduler.
//!
//! This crate contains:
//! - Job and pipeline identifiers
//! - Job rows, their statuses and activation policies
//! - Status aggregation used at both stage and pipeline level
//! - Error types

pub mod error;
pub mod id;
pub mod job;
pub mod status;

pub use error::{Error, Result, StoreError};
pub use id::{JobId, PipelineId};
pub use job::{Job, JobSpec, JobStatus, WhenPolicy};
