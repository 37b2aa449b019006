//! Append-only job table with latest-per-name resolution.

use std::collections::{HashMap, HashSet};

use conveyor_core::{Job, JobId, JobStatus, status};

/// Arena of job rows for one pipeline.
///
/// Rows are never removed. A retry appends a superseding row for the same
/// `(stage_index, name)` pair; the superseded row stays in history but is
/// excluded from every scheduling and aggregation view.
#[derive(Debug, Default)]
pub struct JobTable {
    rows: Vec<Job>,
    by_id: HashMap<JobId, usize>,
    latest: HashMap<(u32, String), usize>,
    superseded: HashSet<JobId>,
}

impl JobTable {
    /// Append a row. If a row with the same stage and name exists it becomes
    /// superseded.
    pub fn push(&mut self, job: Job) {
        let idx = self.rows.len();
        self.by_id.insert(job.id, idx);
        if let Some(old) = self.latest.insert((job.stage_index, job.name.clone()), idx) {
            self.superseded.insert(self.rows[old].id);
        }
        self.rows.push(job);
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.by_id.get(&id).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.by_id.get(&id).map(|&i| &mut self.rows[i])
    }

    /// Whether this row is the most recent one for its name.
    pub fn is_latest(&self, id: JobId) -> bool {
        self.by_id.contains_key(&id) && !self.superseded.contains(&id)
    }

    /// Every row, history included, in insertion order.
    pub fn rows(&self) -> &[Job] {
        &self.rows
    }

    /// The latest row per `(stage_index, name)`, in insertion order.
    pub fn latest_rows(&self) -> impl Iterator<Item = &Job> {
        self.rows.iter().filter(|j| !self.superseded.contains(&j.id))
    }

    pub fn latest_in_stage(&self, stage_index: u32) -> impl Iterator<Item = &Job> {
        self.latest_rows().filter(move |j| j.stage_index == stage_index)
    }

    /// Stage indexes that still hold `created` rows, ascending. Gaps between
    /// indexes are naturally-empty stages and never block.
    pub fn stages_with_created(&self) -> Vec<u32> {
        let mut stages: Vec<u32> = self
            .latest_rows()
            .filter(|j| j.status == JobStatus::Created)
            .map(|j| j.stage_index)
            .collect();
        stages.sort_unstable();
        stages.dedup();
        stages
    }

    /// Aggregate over every latest row in stages before `stage_index`.
    ///
    /// An empty history is `Success`: the implicit "stage -1" always passed.
    pub fn prior_stages_status(&self, stage_index: u32) -> JobStatus {
        let mut prior = self
            .latest_rows()
            .filter(|j| j.stage_index < stage_index)
            .peekable();
        if prior.peek().is_none() {
            return JobStatus::Success;
        }
        status::aggregate(prior.map(|j| (j.status, j.allow_failure)))
    }
}
