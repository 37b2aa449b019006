//! Job rows and their status/policy vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::JobId;

/// Status of a single job. Also used as the aggregate status of a set of
/// jobs (a stage, or a whole pipeline), computed by [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Exists but has not been looked at by the scheduler yet.
    Created,
    /// Queued, waiting for a runner to pick it up.
    Pending,
    /// A runner is executing it.
    Running,
    /// Finished successfully.
    Success,
    /// Finished unsuccessfully.
    Failed,
    /// Canceled by an external action before finishing.
    Canceled,
    /// Will never run: its gating condition was not met, or it is a manual
    /// job waiting for an explicit play.
    Skipped,
}

impl JobStatus {
    /// Whether the scheduler is done with this job: nothing further happens
    /// without an external status write.
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }

    /// Queued or executing.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which a job may auto-start, relative to the aggregate
/// status of the stages before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenPolicy {
    /// Run when the prior stages passed. The default.
    #[default]
    OnSuccess,
    /// Run only when a prior stage failed or was canceled.
    OnFailure,
    /// Run regardless of the prior outcome, as long as it is decided.
    Always,
}

impl WhenPolicy {
    /// Whether a job with this policy may run given the aggregate status of
    /// the stages before it. A skipped history counts as a pass, not a block.
    pub fn permits(self, prior: JobStatus) -> bool {
        match self {
            WhenPolicy::OnSuccess => matches!(prior, JobStatus::Success | JobStatus::Skipped),
            WhenPolicy::OnFailure => matches!(prior, JobStatus::Failed | JobStatus::Canceled),
            WhenPolicy::Always => prior.is_complete(),
        }
    }
}

/// Definition of a job, supplied once at pipeline construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// 0-based; ascending means later.
    pub stage_index: u32,
    pub when: WhenPolicy,
    /// Manual jobs never auto-start; they wait for an explicit play.
    pub manual: bool,
    /// A failure of this job does not fail its stage or pipeline.
    pub allow_failure: bool,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, stage_index: u32) -> Self {
        Self {
            name: name.into(),
            stage_index,
            when: WhenPolicy::default(),
            manual: false,
            allow_failure: false,
        }
    }

    pub fn when(mut self, when: WhenPolicy) -> Self {
        self.when = when;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }
}

/// One job row.
///
/// Rows are append-only: a retry adds a fresh row superseding this one, it
/// never mutates or removes history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Unique within a stage among live (non-superseded) rows.
    pub name: String,
    pub stage_index: u32,
    pub status: JobStatus,
    pub when: WhenPolicy,
    pub manual: bool,
    pub allow_failure: bool,
    /// Row this one supersedes, if it was created by a retry.
    pub retried_from: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh `created` row for the given definition.
    pub fn new(spec: &JobSpec) -> Self {
        Self {
            id: JobId::new(),
            name: spec.name.clone(),
            stage_index: spec.stage_index,
            status: JobStatus::Created,
            when: spec.when,
            manual: spec.manual,
            allow_failure: spec.allow_failure,
            retried_from: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A new `pending` row superseding this one, keeping name, stage and
    /// flags, with a back-reference to this row.
    pub fn retried(&self) -> Self {
        Self {
            id: JobId::new(),
            name: self.name.clone(),
            stage_index: self.stage_index,
            status: JobStatus::Pending,
            when: self.when,
            manual: self.manual,
            allow_failure: self.allow_failure,
            retried_from: Some(self.id),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply a status change, stamping start/finish times.
    pub fn apply_status(&mut self, to: JobStatus) {
        self.status = to;
        match to {
            JobStatus::Created => {
                self.started_at = None;
                self.finished_at = None;
            }
            JobStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            s if s.is_complete() => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_wire_form() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Canceled).unwrap(),
            "\"canceled\""
        );
        assert_eq!(
            serde_json::to_string(&WhenPolicy::OnFailure).unwrap(),
            "\"on_failure\""
        );
        assert_eq!(JobStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn default_policy_is_on_success() {
        assert_eq!(JobSpec::new("rspec", 1).when, WhenPolicy::OnSuccess);
    }

    #[test]
    fn permits_table() {
        use JobStatus::*;
        use WhenPolicy::*;

        assert!(OnSuccess.permits(Success));
        assert!(OnSuccess.permits(Skipped));
        assert!(!OnSuccess.permits(Failed));
        assert!(!OnSuccess.permits(Canceled));

        assert!(OnFailure.permits(Failed));
        assert!(OnFailure.permits(Canceled));
        assert!(!OnFailure.permits(Success));
        assert!(!OnFailure.permits(Skipped));

        assert!(Always.permits(Success));
        assert!(Always.permits(Failed));
        assert!(Always.permits(Canceled));
        assert!(Always.permits(Skipped));
        assert!(!Always.permits(Running));
    }

    #[test]
    fn apply_status_stamps_timestamps() {
        let mut job = Job::new(&JobSpec::new("build", 0));
        assert!(job.started_at.is_none());

        job.apply_status(JobStatus::Pending);
        assert!(job.started_at.is_none());

        job.apply_status(JobStatus::Running);
        assert!(job.started_at.is_some());

        job.apply_status(JobStatus::Success);
        assert!(job.finished_at.is_some());

        // Back to created (downstream reset after a retry) clears the stamps.
        job.apply_status(JobStatus::Created);
        assert!(job.started_at.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn retried_row_points_back_and_starts_pending() {
        let original = Job::new(&JobSpec::new("test", 1).allow_failure());
        let retry = original.retried();

        assert_ne!(retry.id, original.id);
        assert_eq!(retry.retried_from, Some(original.id));
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.name, original.name);
        assert_eq!(retry.stage_index, original.stage_index);
        assert!(retry.allow_failure);
    }
}
