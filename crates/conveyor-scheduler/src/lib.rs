//! Stage-ordered build scheduling for Conveyor pipelines.
//!
//! Decides which created jobs become pending or skipped as stages finish,
//! and when a pipeline as a whole is done. Executing the jobs themselves,
//! parsing configuration and storing artifacts are the embedder's concern:
//! this crate only computes and applies status transitions.

pub mod event;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod table;

pub use event::PipelineEvent;
pub use pipeline::Pipeline;
pub use scheduler::Scheduler;
pub use store::{MemoryStore, Transition, TransitionStore};
pub use table::JobTable;
