use crate::conversion::{BatchStatus, RunOutcome, RunReport};
use batchforge_common::{JobId, RunId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

const MAX_HISTORY_SIZE: usize = 100;

/// Event category for filtering the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Run and batch lifecycle.
    Run,
    /// Per-job lifecycle and progress.
    Job,
}

/// Application-wide event for SSE broadcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========================================================================
    // Run Events
    // ========================================================================
    /// A run has planned its batches and is about to start the first one.
    RunStarted {
        run_id: RunId,
        input_dir: PathBuf,
        output_dir: PathBuf,
        total_files: usize,
        batches: usize,
        category: EventCategory,
    },
    /// A batch has launched all of its jobs.
    BatchStarted {
        run_id: RunId,
        batch: usize,
        jobs: usize,
        category: EventCategory,
    },
    /// A batch's barrier has resolved.
    BatchFinished {
        run_id: RunId,
        batch: usize,
        status: BatchStatus,
        category: EventCategory,
    },
    /// A run has completed or halted.
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        completed: usize,
        failed: usize,
        category: EventCategory,
    },

    // ========================================================================
    // Job Events
    // ========================================================================
    /// A job was handed to the engine.
    JobStarted {
        run_id: RunId,
        job_id: JobId,
        input_path: PathBuf,
        output_path: PathBuf,
        category: EventCategory,
    },
    /// A job reported progress.
    JobProgress {
        job_id: JobId,
        output_path: PathBuf,
        percent: f64,
        eta_secs: Option<u64>,
        category: EventCategory,
    },
    /// A job wrote its output.
    JobCompleted {
        job_id: JobId,
        output_path: PathBuf,
        category: EventCategory,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        input_path: PathBuf,
        error: String,
        category: EventCategory,
    },
    /// A job was stopped because a sibling failed.
    JobCancelled {
        job_id: JobId,
        input_path: PathBuf,
        category: EventCategory,
    },
}

impl AppEvent {
    /// Get the category of this event.
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::RunStarted { category, .. } => *category,
            AppEvent::BatchStarted { category, .. } => *category,
            AppEvent::BatchFinished { category, .. } => *category,
            AppEvent::RunFinished { category, .. } => *category,
            AppEvent::JobStarted { category, .. } => *category,
            AppEvent::JobProgress { category, .. } => *category,
            AppEvent::JobCompleted { category, .. } => *category,
            AppEvent::JobFailed { category, .. } => *category,
            AppEvent::JobCancelled { category, .. } => *category,
        }
    }

    pub fn run_started(
        run_id: RunId,
        input_dir: PathBuf,
        output_dir: PathBuf,
        total_files: usize,
        batches: usize,
    ) -> Self {
        AppEvent::RunStarted {
            run_id,
            input_dir,
            output_dir,
            total_files,
            batches,
            category: EventCategory::Run,
        }
    }

    pub fn batch_started(run_id: RunId, batch: usize, jobs: usize) -> Self {
        AppEvent::BatchStarted {
            run_id,
            batch,
            jobs,
            category: EventCategory::Run,
        }
    }

    pub fn batch_finished(run_id: RunId, batch: usize, status: BatchStatus) -> Self {
        AppEvent::BatchFinished {
            run_id,
            batch,
            status,
            category: EventCategory::Run,
        }
    }

    pub fn run_finished(run_id: RunId, outcome: RunOutcome, completed: usize, failed: usize) -> Self {
        AppEvent::RunFinished {
            run_id,
            outcome,
            completed,
            failed,
            category: EventCategory::Run,
        }
    }

    pub fn job_started(
        run_id: RunId,
        job_id: JobId,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        AppEvent::JobStarted {
            run_id,
            job_id,
            input_path,
            output_path,
            category: EventCategory::Job,
        }
    }

    pub fn job_progress(
        job_id: JobId,
        output_path: PathBuf,
        percent: f64,
        eta_secs: Option<u64>,
    ) -> Self {
        AppEvent::JobProgress {
            job_id,
            output_path,
            percent,
            eta_secs,
            category: EventCategory::Job,
        }
    }

    pub fn job_completed(job_id: JobId, output_path: PathBuf) -> Self {
        AppEvent::JobCompleted {
            job_id,
            output_path,
            category: EventCategory::Job,
        }
    }

    pub fn job_failed(job_id: JobId, input_path: PathBuf, error: String) -> Self {
        AppEvent::JobFailed {
            job_id,
            input_path,
            error,
            category: EventCategory::Job,
        }
    }

    pub fn job_cancelled(job_id: JobId, input_path: PathBuf) -> Self {
        AppEvent::JobCancelled {
            job_id,
            input_path,
            category: EventCategory::Job,
        }
    }
}

/// Process-wide state shared by the server and the coordinator: the event
/// channel and a bounded history of finished runs.
pub struct AppState {
    history: RwLock<VecDeque<RunReport>>,
    event_tx: broadcast::Sender<AppEvent>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);

        Arc::new(Self {
            history: RwLock::new(VecDeque::new()),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Get a clone of the event sender for use in other components.
    pub fn event_sender(&self) -> broadcast::Sender<AppEvent> {
        self.event_tx.clone()
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: AppEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("No subscribers for event");
        }
    }

    /// Keep a finished run's report, evicting the oldest beyond the limit.
    pub fn record_run(&self, report: RunReport) {
        let mut history = self.history.write();
        history.push_front(report);
        while history.len() > MAX_HISTORY_SIZE {
            history.pop_back();
        }
    }

    pub fn get_run(&self, id: RunId) -> Option<RunReport> {
        self.history.read().iter().find(|r| r.run.id == id).cloned()
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Vec<RunReport> {
        self.history.read().iter().take(limit).cloned().collect()
    }
}
