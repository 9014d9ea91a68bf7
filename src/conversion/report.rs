//! Run reports returned to callers.

use std::time::Duration;

use batchforge_common::Error;
use serde::{Deserialize, Serialize};

use super::model::{BatchRun, JobStatus, RunOutcome};

/// Per-status job counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub batches: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs still queued when the run ended (in aborted batches).
    pub not_started: usize,
}

impl RunSummary {
    pub fn from_run(run: &BatchRun) -> Self {
        Self {
            total_files: run.total_jobs(),
            batches: run.batches.len(),
            completed: run.count(JobStatus::Completed),
            failed: run.count(JobStatus::Failed),
            cancelled: run.count(JobStatus::Cancelled),
            not_started: run.count(JobStatus::Queued),
        }
    }
}

/// The structured outcome of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: BatchRun,
    pub summary: RunSummary,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(run: BatchRun, elapsed: Duration) -> Self {
        Self {
            summary: RunSummary::from_run(&run),
            run,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.run.outcome == RunOutcome::Completed
    }

    /// The error a caller should surface when the run halted.
    pub fn halt_error(&self) -> Option<Error> {
        self.run.halted_by.as_ref().map(|h| h.to_error())
    }

    /// One-line human-readable outcome.
    pub fn message(&self) -> String {
        match (&self.run.outcome, &self.run.halted_by) {
            (RunOutcome::Halted, Some(halt)) => format!(
                "Run halted in batch {} of {}: {} failed: {} ({} completed, {} cancelled, {} not started)",
                halt.batch_index,
                self.summary.batches,
                halt.input_path.display(),
                halt.error,
                self.summary.completed,
                self.summary.cancelled,
                self.summary.not_started,
            ),
            _ if self.summary.total_files == 0 => {
                "No matching files found; nothing to convert".to_string()
            }
            _ => format!(
                "All conversions completed: {} files in {} batches",
                self.summary.completed, self.summary.batches
            ),
        }
    }
}
