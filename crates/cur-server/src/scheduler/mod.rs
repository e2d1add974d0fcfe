//! Single-flight job scheduler.
//!
//! [`JobScheduler`] owns the only execution slot in the process: at most one
//! job's runner body executes at a time against the shared database and the
//! rate-limited metadata APIs. Every other operation (enqueue, reorder,
//! pause, cancel request, queries) is a constant-time mutation of in-memory
//! state and may be called concurrently with a running job.
//!
//! All queue state lives behind one `parking_lot::Mutex`, so taking the
//! execution slot (`current: None -> Some`) is atomic: two near-simultaneous
//! dispatch triggers serialize on the lock and the second sees the slot
//! occupied and no-ops.

pub mod job;
pub mod runners;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use cur_core::config::SchedulerConfig;
use cur_core::events::{EventBus, EventCategory, EventPayload};
use cur_core::{JobId, Result};

use job::{Job, JobDescription, JobKind, JobProgress, JobStatus};
use runners::{RunOutcome, TaskRunner};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    current: Option<Job>,
    current_cancel: Option<CancellationToken>,
    pending: VecDeque<Job>,
    /// Terminal jobs, newest first, capped at `history_capacity`.
    history: VecDeque<Job>,
}

struct Shared {
    inner: Mutex<Inner>,
    paused: AtomicBool,
    disposed: AtomicBool,
    bus: Arc<EventBus>,
    runners: HashMap<JobKind, Arc<dyn TaskRunner>>,
    history_capacity: usize,
    job_timeout: Option<Duration>,
}

/// Immutable snapshot of the scheduler's queue state.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SchedulerSnapshot {
    pub current_job: Option<Job>,
    pub pending_queue: Vec<Job>,
    pub is_paused: bool,
}

// ---------------------------------------------------------------------------
// ProgressHandle
// ---------------------------------------------------------------------------

/// Handed to a runner so it can report progress without touching scheduler
/// internals. Reports are fire-and-forget: they update the running job's
/// progress snapshot and broadcast on the event bus, never blocking.
#[derive(Clone)]
pub struct ProgressHandle {
    job_id: JobId,
    scheduler: JobScheduler,
}

impl ProgressHandle {
    pub fn report(&self, current: u64, total: u64, phase: &str, current_item: Option<&str>) {
        let percentage = if total == 0 {
            0.0
        } else {
            current as f32 / total as f32 * 100.0
        };
        {
            let mut inner = self.scheduler.shared.inner.lock();
            if let Some(job) = inner.current.as_mut() {
                if job.id == self.job_id {
                    job.progress = Some(JobProgress {
                        current,
                        total,
                        percentage,
                        phase: phase.to_string(),
                        current_item: current_item.map(String::from),
                    });
                }
            }
        }
        self.scheduler.shared.bus.broadcast(
            EventCategory::Admin,
            EventPayload::JobProgress {
                job_id: self.job_id,
                current,
                total,
                percentage,
                phase: phase.to_string(),
                current_item: current_item.map(String::from),
            },
        );
    }

    /// The event bus, for runners that broadcast analysis results.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.scheduler.shared.bus
    }
}

// ---------------------------------------------------------------------------
// JobScheduler
// ---------------------------------------------------------------------------

/// Stateful single-flight FIFO queue with pause, resume, cancel, and reorder.
///
/// Cheaply cloneable; all clones share the same state.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<Shared>,
}

impl JobScheduler {
    pub fn new(
        config: &SchedulerConfig,
        bus: Arc<EventBus>,
        runners: HashMap<JobKind, Arc<dyn TaskRunner>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                paused: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                bus,
                runners,
                history_capacity: config.history_capacity,
                job_timeout: config.job_timeout_secs.map(Duration::from_secs),
            }),
        }
    }

    // -- Operations ---------------------------------------------------------

    /// Validate and enqueue a job. The queue is unbounded by design; duplicate
    /// descriptions are enqueued distinctly.
    pub fn enqueue(&self, desc: JobDescription) -> Result<JobId> {
        let job = Job::from_description(desc)?;
        let id = job.id;

        self.shared.bus.broadcast(
            EventCategory::Admin,
            EventPayload::JobQueued {
                job_id: id,
                kind: job.kind.as_str().to_string(),
                label: job.label.clone(),
            },
        );
        tracing::info!(job_id = %id, kind = %job.kind, "Job enqueued");

        self.shared.inner.lock().pending.push_back(job);
        self.dispatch_next();
        Ok(id)
    }

    /// Prevent new dispatches. Does not interrupt the running job.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared
            .bus
            .broadcast(EventCategory::Admin, EventPayload::SchedulerPaused);
        tracing::info!("Scheduler paused");
    }

    /// Re-enable dispatch and immediately attempt one.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared
            .bus
            .broadcast(EventCategory::Admin, EventPayload::SchedulerResumed);
        tracing::info!("Scheduler resumed");
        self.dispatch_next();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the running job. The transition to
    /// `Cancelled` happens only after the runner exits, never optimistically.
    /// Returns false when no job is running.
    pub fn cancel_current(&self) -> bool {
        let inner = self.shared.inner.lock();
        match (&inner.current, &inner.current_cancel) {
            (Some(job), Some(cancel)) => {
                tracing::info!(job_id = %job.id, "Cancellation requested");
                cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Remove a queued job. No-op (returns false) when the id is not in the
    /// pending queue; never cancels a running job.
    pub fn remove_from_queue(&self, id: JobId) -> bool {
        let mut inner = self.shared.inner.lock();
        let before = inner.pending.len();
        inner.pending.retain(|j| j.id != id);
        inner.pending.len() < before
    }

    /// Reorder the pending queue to match the given id sequence. Unknown ids
    /// are ignored; queued jobs missing from the sequence keep their relative
    /// order and are appended at the end, so no job is ever lost.
    pub fn reorder_queue(&self, order: &[JobId]) {
        {
            let mut inner = self.shared.inner.lock();
            let mut remaining: VecDeque<Job> = std::mem::take(&mut inner.pending);
            let mut reordered = VecDeque::with_capacity(remaining.len());

            for id in order {
                if let Some(pos) = remaining.iter().position(|j| j.id == *id) {
                    if let Some(job) = remaining.remove(pos) {
                        reordered.push_back(job);
                    }
                }
            }
            reordered.extend(remaining);
            inner.pending = reordered;
        }
        self.shared
            .bus
            .broadcast(EventCategory::Admin, EventPayload::QueueReordered);
    }

    /// Empty the pending queue. Does not touch the running job.
    pub fn clear_queue(&self) {
        self.shared.inner.lock().pending.clear();
        self.shared
            .bus
            .broadcast(EventCategory::Admin, EventPayload::QueueCleared);
    }

    pub fn clear_history(&self) {
        self.shared.inner.lock().history.clear();
        self.shared
            .bus
            .broadcast(EventCategory::Admin, EventPayload::HistoryCleared);
    }

    /// Immutable snapshot of the current job, pending queue, and pause flag.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let inner = self.shared.inner.lock();
        SchedulerSnapshot {
            current_job: inner.current.clone(),
            pending_queue: inner.pending.iter().cloned().collect(),
            is_paused: self.is_paused(),
        }
    }

    /// Immutable snapshot of the history, newest first.
    pub fn history(&self) -> Vec<Job> {
        self.shared.inner.lock().history.iter().cloned().collect()
    }

    /// Shut down: stop dispatching and request cancellation of the running
    /// job. Pending jobs stay queued but will never start.
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.cancel_current();
        tracing::info!("Scheduler disposed");
    }

    // -- Dispatch -----------------------------------------------------------

    /// Start the next job when the slot is free, the scheduler is not paused
    /// or disposed, and the queue is non-empty. Idempotent; fires after every
    /// state-changing operation.
    ///
    /// Loop rather than recursion: a job with no registered runner fails
    /// synchronously and the next candidate is tried in the same frame, so a
    /// burst of runner-less jobs drains without growing the stack.
    fn dispatch_next(&self) {
        loop {
            let (job, cancel, runner) = {
                let mut inner = self.shared.inner.lock();
                if self.shared.disposed.load(Ordering::SeqCst)
                    || self.shared.paused.load(Ordering::SeqCst)
                    || inner.current.is_some()
                {
                    return;
                }
                let Some(mut job) = inner.pending.pop_front() else {
                    return;
                };
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());

                let cancel = CancellationToken::new();
                inner.current = Some(job.clone());
                inner.current_cancel = Some(cancel.clone());

                let runner = self.shared.runners.get(&job.kind).cloned();
                (job, cancel, runner)
            };

            self.shared.bus.broadcast(
                EventCategory::Admin,
                EventPayload::JobStarted { job_id: job.id },
            );
            tracing::info!(job_id = %job.id, kind = %job.kind, "Job started");

            let Some(runner) = runner else {
                self.record_outcome(
                    job.id,
                    Err(cur_core::Error::Internal(format!(
                        "no runner registered for kind {}",
                        job.kind
                    ))),
                    cancel,
                );
                continue;
            };

            let scheduler = self.clone();
            tokio::spawn(async move {
                if let Some(timeout) = scheduler.shared.job_timeout {
                    let watchdog = cancel.clone();
                    let watchdog_id = job.id;
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = watchdog.cancelled() => {}
                            _ = tokio::time::sleep(timeout) => {
                                tracing::warn!(
                                    job_id = %watchdog_id,
                                    "Job exceeded timeout, requesting cancellation"
                                );
                                watchdog.cancel();
                            }
                        }
                    });
                }

                let progress = ProgressHandle {
                    job_id: job.id,
                    scheduler: scheduler.clone(),
                };
                let outcome = runner.run(&job, progress, cancel.clone()).await;
                scheduler.finish_current(job.id, outcome, cancel);
            });
            return;
        }
    }

    /// Record the running job's terminal state, move it to history, and
    /// dispatch the next job. A clean return with the token triggered counts
    /// as cancelled: the runner may have exited its loop before observing the
    /// request.
    fn finish_current(&self, id: JobId, outcome: Result<RunOutcome>, cancel: CancellationToken) {
        self.record_outcome(id, outcome, cancel);
        self.dispatch_next();
    }

    /// Terminal-state bookkeeping only; never re-enters dispatch.
    fn record_outcome(&self, id: JobId, outcome: Result<RunOutcome>, cancel: CancellationToken) {
        let cancel_requested = cancel.is_cancelled();
        // Releases the watchdog task if one is waiting.
        cancel.cancel();

        let finished = {
            let mut inner = self.shared.inner.lock();
            let Some(mut job) = inner.current.take() else {
                return;
            };
            debug_assert_eq!(job.id, id);
            inner.current_cancel = None;

            job.progress = None;
            job.completed_at = Some(Utc::now());
            match outcome {
                Err(e) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(e.to_string());
                }
                Ok(RunOutcome::Cancelled) => {
                    job.status = JobStatus::Cancelled;
                }
                Ok(RunOutcome::Completed(summary)) => {
                    if cancel_requested {
                        job.status = JobStatus::Cancelled;
                    } else {
                        job.status = JobStatus::Completed;
                        job.summary = summary;
                    }
                }
            }

            inner.history.push_front(job.clone());
            while inner.history.len() > self.shared.history_capacity {
                inner.history.pop_back();
            }
            job
        };

        match finished.status {
            JobStatus::Completed => {
                tracing::info!(job_id = %finished.id, "Job completed");
                self.shared.bus.broadcast(
                    EventCategory::Admin,
                    EventPayload::JobCompleted { job_id: finished.id },
                );
            }
            JobStatus::Cancelled => {
                tracing::info!(job_id = %finished.id, "Job cancelled");
                self.shared.bus.broadcast(
                    EventCategory::Admin,
                    EventPayload::JobCancelled { job_id: finished.id },
                );
            }
            JobStatus::Failed => {
                let error = finished.error.clone().unwrap_or_default();
                tracing::warn!(job_id = %finished.id, %error, "Job failed");
                self.shared.bus.broadcast(
                    EventCategory::Admin,
                    EventPayload::JobFailed {
                        job_id: finished.id,
                        error,
                    },
                );
            }
            _ => {}
        }
    }
}
