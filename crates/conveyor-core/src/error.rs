//! Error types for Conveyor.

use thiserror::Error;

use crate::JobId;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed job graph, rejected at pipeline construction.
    #[error("invalid job graph: {0}")]
    InvalidGraph(String),

    /// The per-pipeline process lock could not be acquired in time. Safe to
    /// retry or skip: a pass with nothing to do is a no-op.
    #[error("another scheduling pass is in progress")]
    ProcessingConflict,

    /// Committing transitions failed. No partial state was applied, so the
    /// whole call may be retried.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    /// The operation does not apply to the job in its current state, e.g.
    /// playing a non-manual job or retrying a superseded row.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a transition store commit.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
