//! Persistence seam for status transitions.

use conveyor_core::{JobId, JobStatus, PipelineId, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One status change, computed by a scheduling pass or an external write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub job_id: JobId,
    pub name: String,
    pub stage_index: u32,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Where applied transitions are durably recorded.
///
/// `commit` is all-or-nothing: when it returns an error the pipeline applies
/// none of the batch in memory, so no partial state is ever visible and the
/// whole call can be retried.
pub trait TransitionStore: Send + Sync {
    fn commit(
        &self,
        pipeline_id: PipelineId,
        transitions: &[Transition],
    ) -> Result<(), StoreError>;
}

/// In-process store keeping every committed transition, oldest first.
///
/// The default for pipelines without a database behind them; also convenient
/// for inspecting what a pass did.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Vec<Transition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> Vec<Transition> {
        self.committed.lock().clone()
    }
}

impl TransitionStore for MemoryStore {
    fn commit(
        &self,
        _pipeline_id: PipelineId,
        transitions: &[Transition],
    ) -> Result<(), StoreError> {
        self.committed.lock().extend_from_slice(transitions);
        Ok(())
    }
}
