//! Events emitted as transitions are applied.
//!
//! Collaborators subscribe to drive notifications and webhooks; the payload
//! stays minimal on purpose.

use conveyor_core::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// Event emitted by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A job changed status.
    JobTransitioned {
        id: JobId,
        name: String,
        stage_index: u32,
        from: JobStatus,
        to: JobStatus,
    },
    /// The pipeline aggregate reached a terminal state with no created jobs
    /// left. Emitted once.
    PipelineCompleted { status: JobStatus },
}
