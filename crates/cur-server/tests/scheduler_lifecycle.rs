//! Scheduler lifecycle integration tests.
//!
//! Drives [`JobScheduler`] end to end with stub runners: FIFO ordering,
//! pause/resume, cancellation, queue reordering, failure isolation, and
//! history retention.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use cur_core::config::SchedulerConfig;
use cur_core::events::EventBus;
use cur_core::{Error, LibraryId, Result, SourceId};
use cur_server::scheduler::job::{Job, JobDescription, JobKind, JobScope, JobStatus};
use cur_server::scheduler::runners::{RunOutcome, TaskRunner};
use cur_server::scheduler::{JobScheduler, ProgressHandle};

// ---------------------------------------------------------------------------
// Stub runners
// ---------------------------------------------------------------------------

/// Runs until released (or cancelled), reporting when it starts.
struct HoldRunner {
    kind: JobKind,
    started: mpsc::UnboundedSender<cur_core::JobId>,
    release: Arc<Notify>,
}

#[async_trait]
impl TaskRunner for HoldRunner {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn run(
        &self,
        job: &Job,
        _progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let _ = self.started.send(job.id);
        tokio::select! {
            _ = self.release.notified() => Ok(RunOutcome::Completed(None)),
            _ = cancel.cancelled() => Ok(RunOutcome::Cancelled),
        }
    }
}

/// Completes immediately.
struct InstantRunner {
    kind: JobKind,
}

#[async_trait]
impl TaskRunner for InstantRunner {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn run(
        &self,
        _job: &Job,
        _progress: ProgressHandle,
        _cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        Ok(RunOutcome::Completed(None))
    }
}

/// Always fails.
struct FailRunner {
    kind: JobKind,
}

#[async_trait]
impl TaskRunner for FailRunner {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn run(
        &self,
        _job: &Job,
        _progress: ProgressHandle,
        _cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        Err(Error::Internal("boom".into()))
    }
}

/// Exits cleanly when cancelled, as a cooperative scan loop does when it
/// notices the token between items.
struct CleanExitRunner {
    kind: JobKind,
    started: mpsc::UnboundedSender<cur_core::JobId>,
}

#[async_trait]
impl TaskRunner for CleanExitRunner {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn run(
        &self,
        job: &Job,
        _progress: ProgressHandle,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let _ = self.started.send(job.id);
        cancel.cancelled().await;
        Ok(RunOutcome::Completed(None))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn library_scan_desc() -> JobDescription {
    JobDescription {
        kind: JobKind::LibraryScan,
        label: None,
        scope: JobScope {
            source_id: None,
            library_id: Some(LibraryId::new()),
        },
    }
}

fn scheduler_with(
    config: &SchedulerConfig,
    runners: HashMap<JobKind, Arc<dyn TaskRunner>>,
) -> JobScheduler {
    JobScheduler::new(config, Arc::new(EventBus::default()), runners)
}

/// Poll until the condition holds or a 5s deadline passes.
async fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// FIFO single-flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fifo_single_flight_execution() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release: release.clone(),
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();
    let j3 = s.enqueue(library_scan_desc()).unwrap();

    // J1 takes the slot; J2 and J3 wait in order.
    assert_eq!(started_rx.recv().await, Some(j1));
    let snap = s.snapshot();
    let current = snap.current_job.expect("expected a running job");
    assert_eq!(current.id, j1);
    assert_eq!(current.status, JobStatus::Running);
    assert!(current.started_at.is_some());
    let pending: Vec<_> = snap.pending_queue.iter().map(|j| j.id).collect();
    assert_eq!(pending, vec![j2, j3]);

    // No job id appears both running and queued.
    assert!(!pending.contains(&j1));

    // Releasing J1 starts J2, then J3.
    release.notify_one();
    assert_eq!(started_rx.recv().await, Some(j2));
    release.notify_one();
    assert_eq!(started_rx.recv().await, Some(j3));
    release.notify_one();

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 3).await;

    // History is newest first and all three completed.
    let history = s.history();
    let ids: Vec<_> = history.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![j3, j2, j1]);
    assert!(history.iter().all(|j| j.status == JobStatus::Completed));
    assert!(history.iter().all(|j| j.completed_at.is_some()));
    assert!(s.snapshot().current_job.is_none());
}

// ---------------------------------------------------------------------------
// Pause and resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_lets_running_job_finish_and_holds_queue() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release: release.clone(),
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();
    assert_eq!(started_rx.recv().await, Some(j1));

    // Pausing mid-run does not interrupt J1, and enqueues still land.
    s.pause();
    assert!(s.is_paused());
    let j3 = s.enqueue(library_scan_desc()).unwrap();
    let snap = s.snapshot();
    assert_eq!(snap.current_job.as_ref().map(|j| j.id), Some(j1));
    let pending: Vec<_> = snap.pending_queue.iter().map(|j| j.id).collect();
    assert_eq!(pending, vec![j2, j3]);
    release.notify_one();

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    assert_eq!(s.history()[0].id, j1);
    assert_eq!(s.history()[0].status, JobStatus::Completed);

    // J2 must not have been dispatched while paused.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snap = s.snapshot();
    assert!(snap.current_job.is_none());
    assert_eq!(snap.pending_queue.len(), 2);
    assert_eq!(snap.pending_queue[0].id, j2);

    // Resume dispatches in order.
    s.resume();
    assert_eq!(started_rx.recv().await, Some(j2));
    release.notify_one();
    assert_eq!(started_rx.recv().await, Some(j3));
    release.notify_one();
    let s3 = s.clone();
    wait_until(move || s3.history().len() == 3).await;
}

// ---------------------------------------------------------------------------
// Reorder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reorder_is_lossless() {
    let s = scheduler_with(&SchedulerConfig::default(), HashMap::new());
    s.pause();

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();
    let j3 = s.enqueue(library_scan_desc()).unwrap();

    // Partial order: unmentioned jobs keep relative order at the end.
    s.reorder_queue(&[j3, j2]);
    let pending: Vec<_> = s.snapshot().pending_queue.iter().map(|j| j.id).collect();
    assert_eq!(pending, vec![j3, j2, j1]);

    // Unknown ids are ignored; nothing is lost or duplicated.
    s.reorder_queue(&[cur_core::JobId::new(), j1, j1]);
    let pending: Vec<_> = s.snapshot().pending_queue.iter().map(|j| j.id).collect();
    assert_eq!(pending, vec![j1, j3, j2]);
}

#[tokio::test]
async fn remove_from_queue_only_touches_pending() {
    let s = scheduler_with(&SchedulerConfig::default(), HashMap::new());
    s.pause();

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();

    assert!(s.remove_from_queue(j1));
    assert!(!s.remove_from_queue(j1));
    let pending: Vec<_> = s.snapshot().pending_queue.iter().map(|j| j.id).collect();
    assert_eq!(pending, vec![j2]);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_current_is_cooperative() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release,
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    assert_eq!(started_rx.recv().await, Some(j1));

    assert!(s.cancel_current());
    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;

    let job = &s.history()[0];
    assert_eq!(job.id, j1);
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(s.snapshot().current_job.is_none());
}

#[tokio::test]
async fn clean_exit_after_cancel_counts_as_cancelled() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(CleanExitRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    assert_eq!(started_rx.recv().await, Some(j1));

    // The runner returns Completed, but the token was triggered first.
    assert!(s.cancel_current());
    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    assert_eq!(s.history()[0].status, JobStatus::Cancelled);
}

#[tokio::test]
async fn timed_out_job_is_cancelled() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release,
        }),
    );
    let config = SchedulerConfig {
        job_timeout_secs: Some(0),
        ..SchedulerConfig::default()
    };
    let s = scheduler_with(&config, runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    assert_eq!(started_rx.recv().await, Some(j1));

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    assert_eq!(s.history()[0].status, JobStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_records_error_and_advances() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::SeriesCompleteness,
        Arc::new(FailRunner {
            kind: JobKind::SeriesCompleteness,
        }),
    );
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release: release.clone(),
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let failing = s
        .enqueue(JobDescription {
            kind: JobKind::SeriesCompleteness,
            label: None,
            scope: JobScope {
                source_id: None,
                library_id: Some(LibraryId::new()),
            },
        })
        .unwrap();
    let next = s.enqueue(library_scan_desc()).unwrap();

    // The failure does not stall the queue.
    assert_eq!(started_rx.recv().await, Some(next));
    release.notify_one();

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 2).await;
    let history = s.history();
    assert_eq!(history[1].id, failing);
    assert_eq!(history[1].status, JobStatus::Failed);
    assert!(history[1].error.as_deref().unwrap_or("").contains("boom"));
    assert_eq!(history[0].id, next);
    assert_eq!(history[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn missing_runner_fails_the_job() {
    let s = scheduler_with(&SchedulerConfig::default(), HashMap::new());
    let j1 = s.enqueue(library_scan_desc()).unwrap();

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    let job = &s.history()[0];
    assert_eq!(job.id, j1);
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn runner_less_backlog_drains_in_order() {
    let config = SchedulerConfig {
        history_capacity: 64,
        ..Default::default()
    };
    let s = scheduler_with(&config, HashMap::new());

    // Pause first so the whole backlog is queued before dispatch touches it,
    // then resume and let the scheduler chew through it in one go.
    s.pause();
    let ids: Vec<_> = (0..40)
        .map(|_| s.enqueue(library_scan_desc()).unwrap())
        .collect();
    assert_eq!(s.snapshot().pending_queue.len(), 40);
    s.resume();

    let s2 = s.clone();
    wait_until(move || s2.history().len() == 40).await;

    let snapshot = s.snapshot();
    assert!(snapshot.current_job.is_none());
    assert!(snapshot.pending_queue.is_empty());

    let history = s.history();
    assert!(history.iter().all(|j| j.status == JobStatus::Failed));
    // Newest first: the last enqueued job heads the history.
    let recorded: Vec<_> = history.iter().rev().map(|j| j.id).collect();
    assert_eq!(recorded, ids);
}

// ---------------------------------------------------------------------------
// History retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_evicts_oldest_beyond_capacity() {
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(InstantRunner {
            kind: JobKind::LibraryScan,
        }),
    );
    let config = SchedulerConfig {
        history_capacity: 2,
        ..SchedulerConfig::default()
    };
    let s = scheduler_with(&config, runners);

    let _j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();
    let j3 = s.enqueue(library_scan_desc()).unwrap();

    let s2 = s.clone();
    wait_until(move || {
        let h = s2.history();
        h.len() == 2 && h[0].id == j3
    })
    .await;
    let ids: Vec<_> = s.history().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![j3, j2]);
}

#[tokio::test]
async fn clear_history_and_queue() {
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(InstantRunner {
            kind: JobKind::LibraryScan,
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    s.enqueue(library_scan_desc()).unwrap();
    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    s.clear_history();
    assert!(s.history().is_empty());

    s.pause();
    s.enqueue(library_scan_desc()).unwrap();
    s.enqueue(library_scan_desc()).unwrap();
    s.clear_queue();
    assert!(s.snapshot().pending_queue.is_empty());
}

// ---------------------------------------------------------------------------
// Scope validation and dispose
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_scope_is_rejected_at_enqueue() {
    let s = scheduler_with(&SchedulerConfig::default(), HashMap::new());

    let err = s
        .enqueue(JobDescription {
            kind: JobKind::LibraryScan,
            label: None,
            scope: JobScope::default(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = s
        .enqueue(JobDescription {
            kind: JobKind::SourceScan,
            label: None,
            scope: JobScope {
                source_id: None,
                library_id: Some(LibraryId::new()),
            },
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // SourceScan with a source id is fine.
    s.enqueue(JobDescription {
        kind: JobKind::SourceScan,
        label: Some("scan plex".into()),
        scope: JobScope {
            source_id: Some(SourceId::new()),
            library_id: None,
        },
    })
    .unwrap();
}

#[tokio::test]
async fn disposed_scheduler_stops_dispatching() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let mut runners: HashMap<JobKind, Arc<dyn TaskRunner>> = HashMap::new();
    runners.insert(
        JobKind::LibraryScan,
        Arc::new(HoldRunner {
            kind: JobKind::LibraryScan,
            started: started_tx,
            release,
        }),
    );
    let s = scheduler_with(&SchedulerConfig::default(), runners);

    let j1 = s.enqueue(library_scan_desc()).unwrap();
    let j2 = s.enqueue(library_scan_desc()).unwrap();
    assert_eq!(started_rx.recv().await, Some(j1));

    // Dispose cancels the running job and strands the queue.
    s.dispose();
    let s2 = s.clone();
    wait_until(move || s2.history().len() == 1).await;
    assert_eq!(s.history()[0].status, JobStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snap = s.snapshot();
    assert!(snap.current_job.is_none());
    assert_eq!(snap.pending_queue[0].id, j2);
}
