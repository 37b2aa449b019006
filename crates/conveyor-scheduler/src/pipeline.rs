//! Pipeline entity: owns the job table and drives scheduling passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use conveyor_core::{Error, Job, JobId, JobSpec, JobStatus, PipelineId, Result, status};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::event::PipelineEvent;
use crate::scheduler::Scheduler;
use crate::store::{MemoryStore, Transition, TransitionStore};
use crate::table::JobTable;

/// How long a second concurrent `process` caller waits for the pass lock
/// before giving up with [`Error::ProcessingConflict`].
const PROCESS_LOCK_WAIT: Duration = Duration::from_millis(100);

/// A pipeline: an append-only set of job rows grouped into ordered stages.
///
/// The aggregate status is always derived from the rows, never stored, so it
/// cannot drift. Instances are meant to be shared (`Arc<Pipeline>`) between
/// the triggers that call [`Pipeline::process`]; at most one pass runs at a
/// time per pipeline.
pub struct Pipeline {
    id: PipelineId,
    table: RwLock<JobTable>,
    store: Arc<dyn TransitionStore>,
    process_lock: Mutex<()>,
    subscribers: Mutex<Vec<mpsc::Sender<PipelineEvent>>>,
    completed: AtomicBool,
}

impl Pipeline {
    /// Build a pipeline from job definitions. Every job starts `created`;
    /// transitions are kept in an in-process [`MemoryStore`].
    pub fn new(specs: Vec<JobSpec>) -> Result<Self> {
        Self::with_store(specs, Arc::new(MemoryStore::new()))
    }

    /// Build a pipeline committing transitions through `store`.
    pub fn with_store(specs: Vec<JobSpec>, store: Arc<dyn TransitionStore>) -> Result<Self> {
        validate_graph(&specs)?;

        let mut table = JobTable::default();
        for spec in &specs {
            table.push(Job::new(spec));
        }

        Ok(Self {
            id: PipelineId::new(),
            table: RwLock::new(table),
            store,
            process_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Run one scheduling pass: activate or skip created jobs whose gating
    /// stages have finished, commit the batch, apply it, emit events.
    ///
    /// Returns whether any job changed status. Idempotent: calling again
    /// with no intervening status write is a no-op returning `Ok(false)`.
    pub fn process(&self) -> Result<bool> {
        let _guard = self
            .process_lock
            .try_lock_for(PROCESS_LOCK_WAIT)
            .ok_or(Error::ProcessingConflict)?;

        // The table stays locked from planning through apply: no status
        // write can land in between, so the committed batch is exactly the
        // batch applied in memory.
        let mut table = self.table.write();
        let planned = Scheduler::plan(&table);
        if planned.is_empty() {
            drop(table);
            debug!(pipeline = %self.id, "nothing to schedule");
            self.notify_if_complete();
            return Ok(false);
        }

        // Nothing is applied until the commit succeeds, so a store failure
        // leaves no partial state behind.
        self.store.commit(self.id, &planned)?;

        for t in &planned {
            if let Some(job) = table.get_mut(t.job_id) {
                job.apply_status(t.to);
            }
            info!(
                pipeline = %self.id,
                job = %t.name,
                stage = t.stage_index,
                from = %t.from,
                to = %t.to,
                "job transitioned"
            );
        }
        drop(table);

        for t in planned {
            self.emit(PipelineEvent::JobTransitioned {
                id: t.job_id,
                name: t.name,
                stage_index: t.stage_index,
                from: t.from,
                to: t.to,
            });
        }
        self.notify_if_complete();
        Ok(true)
    }

    /// Aggregate status over the latest row of every job name, across all
    /// stages. Recomputed on demand.
    pub fn status(&self) -> JobStatus {
        let table = self.table.read();
        status::aggregate(table.latest_rows().map(|j| (j.status, j.allow_failure)))
    }

    /// Manual jobs currently parked as `skipped` that an external play would
    /// legitimately start: their policy must be satisfied by the current
    /// aggregate of the stages before them. A manual job skipped because its
    /// gating stage failed is not playable.
    pub fn manual_actions(&self) -> Vec<Job> {
        let table = self.table.read();
        table
            .latest_rows()
            .filter(|j| j.manual && j.status == JobStatus::Skipped)
            .filter(|j| {
                let prior = table.prior_stages_status(j.stage_index);
                j.when.permits(prior)
            })
            .cloned()
            .collect()
    }

    /// The latest row of every job name, in insertion order.
    pub fn jobs(&self) -> Vec<Job> {
        self.table.read().latest_rows().cloned().collect()
    }

    /// Every row ever created, superseded retries included.
    pub fn history(&self) -> Vec<Job> {
        self.table.read().rows().to_vec()
    }

    /// External status write: a runner started, finished or dropped a job.
    /// The write is visible to the next `process` pass.
    pub fn set_status(&self, id: JobId, to: JobStatus) -> Result<()> {
        let mut table = self.table.write();
        let job = table.get(id).ok_or(Error::UnknownJob(id))?;
        if job.status == to {
            return Ok(());
        }
        if !table.is_latest(id) {
            // A stale runner reporting on a row that was retried meanwhile;
            // recorded for history but invisible to aggregation.
            warn!(pipeline = %self.id, job = %job.name, to = %to, "status write to superseded row");
        }
        let transition = Transition {
            job_id: id,
            name: job.name.clone(),
            stage_index: job.stage_index,
            from: job.status,
            to,
        };

        self.store.commit(self.id, std::slice::from_ref(&transition))?;
        if let Some(job) = table.get_mut(id) {
            job.apply_status(to);
        }
        drop(table);

        info!(pipeline = %self.id, job = %transition.name, from = %transition.from, to = %transition.to, "status written");
        self.emit(PipelineEvent::JobTransitioned {
            id,
            name: transition.name,
            stage_index: transition.stage_index,
            from: transition.from,
            to: transition.to,
        });
        Ok(())
    }

    /// Explicit play of a manual job: moves it out of `skipped`/`created`
    /// into the queue.
    pub fn play(&self, id: JobId) -> Result<()> {
        {
            let table = self.table.read();
            let job = table.get(id).ok_or(Error::UnknownJob(id))?;
            if !job.manual {
                return Err(Error::InvalidAction(format!(
                    "job '{}' is not a manual job",
                    job.name
                )));
            }
            if !table.is_latest(id) {
                return Err(Error::InvalidAction(format!(
                    "job '{}' has been superseded by a retry",
                    job.name
                )));
            }
            if !matches!(job.status, JobStatus::Skipped | JobStatus::Created) {
                return Err(Error::InvalidAction(format!(
                    "job '{}' is {} and cannot be played",
                    job.name, job.status
                )));
            }
        }
        self.set_status(id, JobStatus::Pending)
    }

    /// Create a fresh row superseding a finished job.
    ///
    /// Later-stage rows that were auto-skipped go back to `created`, so the
    /// next pass re-evaluates them against the retried outcome exactly as in
    /// a fresh walk. Returns the id of the new row.
    pub fn retry(&self, id: JobId) -> Result<JobId> {
        let mut table = self.table.write();
        let job = table.get(id).ok_or(Error::UnknownJob(id))?;
        if !table.is_latest(id) {
            return Err(Error::InvalidAction(format!(
                "job '{}' has already been retried",
                job.name
            )));
        }
        if !job.status.is_complete() {
            return Err(Error::InvalidAction(format!(
                "job '{}' is {} and cannot be retried",
                job.name, job.status
            )));
        }

        let retry = job.retried();
        let retry_id = retry.id;
        let stage_index = job.stage_index;

        // The log entry carries the superseded row's status, so the stream
        // for this name reads as one continuous attempt.
        let mut transitions = vec![Transition {
            job_id: retry_id,
            name: retry.name.clone(),
            stage_index,
            from: job.status,
            to: retry.status,
        }];
        transitions.extend(
            table
                .latest_rows()
                .filter(|j| j.stage_index > stage_index && j.status == JobStatus::Skipped)
                .map(|j| Transition {
                    job_id: j.id,
                    name: j.name.clone(),
                    stage_index: j.stage_index,
                    from: j.status,
                    to: JobStatus::Created,
                }),
        );

        self.store.commit(self.id, &transitions)?;

        table.push(retry);
        for t in transitions.iter().skip(1) {
            if let Some(job) = table.get_mut(t.job_id) {
                job.apply_status(JobStatus::Created);
            }
        }
        drop(table);

        // The pipeline may have looked finished before the retry.
        self.completed.store(false, Ordering::Release);

        info!(pipeline = %self.id, job_id = %id, retry_id = %retry_id, "job retried");
        for t in transitions {
            self.emit(PipelineEvent::JobTransitioned {
                id: t.job_id,
                name: t.name,
                stage_index: t.stage_index,
                from: t.from,
                to: t.to,
            });
        }
        Ok(retry_id)
    }

    /// Cancel every job that has not finished, created rows included.
    /// Returns the ids of the canceled jobs.
    pub fn cancel_all(&self) -> Result<Vec<JobId>> {
        let mut table = self.table.write();
        let transitions: Vec<Transition> = table
            .latest_rows()
            .filter(|j| !j.status.is_complete())
            .map(|j| Transition {
                job_id: j.id,
                name: j.name.clone(),
                stage_index: j.stage_index,
                from: j.status,
                to: JobStatus::Canceled,
            })
            .collect();
        if transitions.is_empty() {
            return Ok(Vec::new());
        }

        self.store.commit(self.id, &transitions)?;
        for t in &transitions {
            if let Some(job) = table.get_mut(t.job_id) {
                job.apply_status(JobStatus::Canceled);
            }
        }
        drop(table);

        info!(pipeline = %self.id, count = transitions.len(), "jobs canceled");
        let ids = transitions.iter().map(|t| t.job_id).collect();
        for t in transitions {
            self.emit(PipelineEvent::JobTransitioned {
                id: t.job_id,
                name: t.name,
                stage_index: t.stage_index,
                from: t.from,
                to: t.to,
            });
        }
        Ok(ids)
    }

    /// Receive an event for every transition applied from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notify_if_complete(&self) {
        let status = {
            let table = self.table.read();
            if table
                .latest_rows()
                .any(|j| j.status == JobStatus::Created)
            {
                return;
            }
            status::aggregate(table.latest_rows().map(|j| (j.status, j.allow_failure)))
        };
        if !status.is_complete() {
            return;
        }
        if !self.completed.swap(true, Ordering::AcqRel) {
            info!(pipeline = %self.id, status = %status, "pipeline complete");
            self.emit(PipelineEvent::PipelineCompleted { status });
        }
    }
}

fn validate_graph(specs: &[JobSpec]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if spec.name.is_empty() {
            return Err(Error::InvalidGraph("job name must not be empty".into()));
        }
        if !seen.insert((spec.stage_index, spec.name.as_str())) {
            return Err(Error::InvalidGraph(format!(
                "duplicate job '{}' in stage {}",
                spec.name, spec.stage_index
            )));
        }
    }
    Ok(())
}
