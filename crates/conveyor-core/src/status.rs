//! Status aggregation over collections of jobs.

use crate::JobStatus;

/// Reduce a set of `(status, allow_failure)` pairs to a single aggregate.
///
/// The same rule applies at stage level and across a whole pipeline. Checks
/// are ordered by priority, first match wins:
///
/// 1. empty set → `Skipped` (an empty stage never blocks)
/// 2. any job not yet finished → `Running`
/// 3. any non-allow-failure job `Failed` → `Failed`
/// 4. any job `Canceled` → `Canceled`
/// 5. all jobs `Skipped` → `Skipped`
/// 6. otherwise → `Success`
///
/// Allow-failure forgives a terminal failure only: a failed optional job is
/// excluded from the failed check, but while it is still queued or running
/// it holds the aggregate open like any other job.
pub fn aggregate<I>(entries: I) -> JobStatus
where
    I: IntoIterator<Item = (JobStatus, bool)>,
{
    let mut empty = true;
    let mut unfinished = false;
    let mut failed = false;
    let mut canceled = false;
    let mut all_skipped = true;

    for (status, allow_failure) in entries {
        empty = false;
        if !status.is_complete() {
            unfinished = true;
        }
        if !allow_failure && status == JobStatus::Failed {
            failed = true;
        }
        if status == JobStatus::Canceled {
            canceled = true;
        }
        if status != JobStatus::Skipped {
            all_skipped = false;
        }
    }

    if empty {
        JobStatus::Skipped
    } else if unfinished {
        JobStatus::Running
    } else if failed {
        JobStatus::Failed
    } else if canceled {
        JobStatus::Canceled
    } else if all_skipped {
        JobStatus::Skipped
    } else {
        JobStatus::Success
    }
}
