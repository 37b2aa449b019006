//! The scheduling pass: decides which created jobs start or skip.

use std::collections::HashMap;

use conveyor_core::{JobId, JobStatus, status};
use tracing::debug;

use crate::store::Transition;
use crate::table::JobTable;

/// Computes the transitions one `process` pass should apply.
///
/// A pass is pure: it reads the table and returns the planned transitions
/// without touching it, so a failed commit has nothing to roll back. With no
/// created jobs left (or every gating stage still unfinished) the plan is
/// empty, which is what makes repeated passes idempotent.
pub struct Scheduler;

impl Scheduler {
    /// Walk the stages in order and plan transitions for created jobs.
    ///
    /// Each stage is gated on the aggregate of *all* earlier stages, not just
    /// the adjacent one: a failure in stage 1 still gates stage 3 even if an
    /// `always` job in stage 2 succeeded in between. Transitions planned for
    /// earlier stages are visible to later gating decisions within the same
    /// pass, so a stage whose jobs all skip (e.g. manual-only) lets the walk
    /// continue immediately.
    pub fn plan(table: &JobTable) -> Vec<Transition> {
        let mut planned = Vec::new();
        let mut overlay: HashMap<JobId, JobStatus> = HashMap::new();

        for stage_index in table.stages_with_created() {
            let prior = Self::prior_status(table, &overlay, stage_index);
            if !prior.is_complete() {
                debug!(stage = stage_index, prior = %prior, "prior stages unfinished, stage left untouched");
                continue;
            }

            for job in table.latest_in_stage(stage_index) {
                if job.status != JobStatus::Created {
                    continue;
                }
                let to = if !job.when.permits(prior) || job.manual {
                    // Manual jobs are parked as skipped until played.
                    JobStatus::Skipped
                } else {
                    JobStatus::Pending
                };
                debug!(job = %job.name, stage = stage_index, prior = %prior, to = %to, "planned transition");
                overlay.insert(job.id, to);
                planned.push(Transition {
                    job_id: job.id,
                    name: job.name.clone(),
                    stage_index,
                    from: job.status,
                    to,
                });
            }
        }

        planned
    }

    /// Aggregate over all latest rows before `stage_index`, seeing through to
    /// the transitions already planned in this pass. Empty history is the
    /// implicit passing "stage -1".
    fn prior_status(
        table: &JobTable,
        overlay: &HashMap<JobId, JobStatus>,
        stage_index: u32,
    ) -> JobStatus {
        let mut prior = table
            .latest_rows()
            .filter(|j| j.stage_index < stage_index)
            .peekable();
        if prior.peek().is_none() {
            return JobStatus::Success;
        }
        status::aggregate(prior.map(|j| {
            let status = overlay.get(&j.id).copied().unwrap_or(j.status);
            (status, j.allow_failure)
        }))
    }
}
