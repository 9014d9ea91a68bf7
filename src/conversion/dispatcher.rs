//! Batch dispatcher.
//!
//! Runs a planned [`BatchRun`] one batch at a time. Every job of a batch is
//! started together and the batch resolves once all of them have settled.
//! The first failure in a batch cancels the siblings still in flight, marks
//! the batch failed and every later batch aborted, and halts the run.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batchforge_av::{ProgressEvent, TranscodeEvent, Transcoder};
use batchforge_common::{Error, Result, RunId};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::{Batch, BatchRun, BatchStatus, HaltReason, JobStatus, RunConfig, RunOutcome};
use crate::state::AppEvent;

/// Progress sample from a job task, tagged with its position in the batch.
struct ProgressUpdate {
    slot: usize,
    event: ProgressEvent,
}

/// Executes runs against a [`Transcoder`].
pub struct BatchDispatcher {
    transcoder: Arc<dyn Transcoder>,
    event_tx: Option<broadcast::Sender<AppEvent>>,
    job_timeout: Option<Duration>,
}

impl BatchDispatcher {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            transcoder,
            event_tx: None,
            job_timeout: None,
        }
    }

    /// Forward lifecycle and progress events to `event_tx`.
    pub fn with_events(mut self, event_tx: broadcast::Sender<AppEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Fail any job that has not settled within `timeout`.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    fn broadcast(&self, event: AppEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                debug!("No subscribers for dispatcher event");
            }
        }
    }

    /// Plan `files` (names inside `config.input_dir`) and execute the run.
    ///
    /// Only an invalid plan is an `Err`; job failures are recorded in the
    /// returned run.
    pub async fn run<S: AsRef<str>>(&self, files: &[S], config: &RunConfig) -> Result<BatchRun> {
        let mut run = BatchRun::plan(files, config)?;
        self.execute(&mut run).await;
        Ok(run)
    }

    /// Execute an already planned run in batch order.
    pub async fn execute(&self, run: &mut BatchRun) {
        run.started_at = Some(Utc::now());
        info!(
            run_id = %run.id,
            files = run.total_jobs(),
            batches = run.batches.len(),
            batch_size = run.batch_size,
            engine = self.transcoder.name(),
            "Starting conversion run"
        );
        self.broadcast(AppEvent::run_started(
            run.id,
            run.input_directory.clone(),
            run.output_directory.clone(),
            run.total_jobs(),
            run.batches.len(),
        ));

        let run_id = run.id;
        let mut halted_at = None;
        for (i, batch) in run.batches.iter_mut().enumerate() {
            if let Some(halt) = self.run_batch(run_id, batch).await {
                run.halted_by = Some(halt);
                halted_at = Some(i);
                break;
            }
        }

        match halted_at {
            Some(i) => {
                for batch in &mut run.batches[i + 1..] {
                    batch.status = BatchStatus::Aborted;
                }
                run.outcome = RunOutcome::Halted;
            }
            None => run.outcome = RunOutcome::Completed,
        }
        run.finished_at = Some(Utc::now());

        let completed = run.count(JobStatus::Completed);
        let failed = run.count(JobStatus::Failed);
        match run.halted_by {
            Some(ref halt) => warn!(
                run_id = %run.id,
                batch = halt.batch_index,
                input = %halt.input_path.display(),
                completed,
                "Conversion run halted: {}",
                halt.error
            ),
            None => info!(run_id = %run.id, completed, "Conversion run completed"),
        }
        self.broadcast(AppEvent::run_finished(run.id, run.outcome, completed, failed));
    }

    /// Run one batch to its barrier. Returns the halt reason if a job failed.
    async fn run_batch(&self, run_id: RunId, batch: &mut Batch) -> Option<HaltReason> {
        batch.status = BatchStatus::InProgress;
        info!(run_id = %run_id, batch = batch.index, jobs = batch.len(), "Starting batch");
        self.broadcast(AppEvent::batch_started(run_id, batch.index, batch.len()));

        let cancel = CancellationToken::new();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (slot, job) in batch.jobs.iter_mut().enumerate() {
            job.start();
            debug!(
                job_id = %job.id,
                input = %job.input_path().display(),
                output = %job.output_path().display(),
                "Dispatching job"
            );
            self.broadcast(AppEvent::job_started(
                run_id,
                job.id,
                job.input_path().to_path_buf(),
                job.output_path().to_path_buf(),
            ));

            let work = run_job(
                Arc::clone(&self.transcoder),
                slot,
                job.input_path().to_path_buf(),
                job.output_path().to_path_buf(),
                cancel.child_token(),
                self.job_timeout,
                progress_tx.clone(),
            );
            tasks.spawn(async move {
                let result = AssertUnwindSafe(work)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(Error::unexpected("conversion task panicked")));
                (slot, result)
            });
        }
        drop(progress_tx);

        let mut halt: Option<HaltReason> = None;
        loop {
            tokio::select! {
                biased;
                Some(update) = progress_rx.recv() => self.apply_progress(batch, update),
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    // Progress sent before the job settled must land first.
                    while let Ok(update) = progress_rx.try_recv() {
                        self.apply_progress(batch, update);
                    }
                    match joined {
                        Ok((slot, result)) => {
                            if let Some(reason) = self.settle_job(batch, slot, result, halt.is_some()) {
                                cancel.cancel();
                                halt = Some(reason);
                            }
                        }
                        Err(e) => error!(batch = batch.index, "Conversion task aborted: {e}"),
                    }
                }
            }
        }

        for job in batch.jobs.iter_mut().filter(|j| !j.is_settled()) {
            job.fail("conversion task ended without settling");
            if halt.is_none() {
                halt = Some(HaltReason {
                    batch_index: batch.index,
                    job_id: job.id,
                    input_path: job.input_path().to_path_buf(),
                    error: "conversion task ended without settling".to_string(),
                });
            }
        }

        match halt {
            Some(ref reason) => {
                batch.status = BatchStatus::Failed;
                batch.error = Some(reason.error.clone());
            }
            None => batch.status = BatchStatus::Completed,
        }
        info!(run_id = %run_id, batch = batch.index, status = ?batch.status, "Batch finished");
        self.broadcast(AppEvent::batch_finished(run_id, batch.index, batch.status));
        halt
    }

    fn apply_progress(&self, batch: &mut Batch, update: ProgressUpdate) {
        let Some(job) = batch.jobs.get_mut(update.slot) else {
            return;
        };
        if job.is_settled() {
            return;
        }
        let eta_secs = update.event.eta.map(|d| d.as_secs());
        if job.update_progress(update.event.percent, eta_secs) {
            self.broadcast(AppEvent::job_progress(
                job.id,
                job.output_path().to_path_buf(),
                update.event.percent.clamp(0.0, 100.0),
                eta_secs,
            ));
        }
    }

    /// Record a job's terminal result. Returns a halt reason when this is
    /// the batch's first failure.
    fn settle_job(
        &self,
        batch: &mut Batch,
        slot: usize,
        result: Result<PathBuf>,
        already_halted: bool,
    ) -> Option<HaltReason> {
        let batch_index = batch.index;
        let job = batch.jobs.get_mut(slot)?;

        match result {
            Ok(_) => {
                job.complete();
                info!(job_id = %job.id, output = %job.output_path().display(), "Conversion completed");
                self.broadcast(AppEvent::job_completed(job.id, job.output_path().to_path_buf()));
                None
            }
            Err(Error::Cancelled) if already_halted => {
                job.cancel("cancelled after another job in the batch failed");
                debug!(job_id = %job.id, "Conversion cancelled");
                self.broadcast(AppEvent::job_cancelled(job.id, job.input_path().to_path_buf()));
                None
            }
            Err(e) => {
                let message = Error::job_failure(job.input_path(), e.to_string()).to_string();
                job.fail(&message);
                error!(
                    job_id = %job.id,
                    batch = batch_index,
                    input = %job.input_path().display(),
                    "Conversion failed: {message}"
                );
                self.broadcast(AppEvent::job_failed(
                    job.id,
                    job.input_path().to_path_buf(),
                    message.clone(),
                ));
                if already_halted {
                    return None;
                }
                Some(HaltReason {
                    batch_index,
                    job_id: job.id,
                    input_path: job.input_path().to_path_buf(),
                    error: message,
                })
            }
        }
    }
}

/// Drive one job to its terminal result.
///
/// Cancellation and the timeout drop the engine handle, which stops the
/// engine; neither waits for the engine process to exit.
async fn run_job(
    transcoder: Arc<dyn Transcoder>,
    slot: usize,
    input: PathBuf,
    output: PathBuf,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    progress: mpsc::UnboundedSender<ProgressUpdate>,
) -> Result<PathBuf> {
    let work = async {
        let mut handle = transcoder.start(&input, &output).await?;
        loop {
            match handle.next().await {
                Some(TranscodeEvent::Progress(event)) => {
                    let _ = progress.send(ProgressUpdate { slot, event });
                }
                Some(TranscodeEvent::Completed(path)) => return Ok(path),
                Some(TranscodeEvent::Failed(e)) => return Err(e),
                None => {
                    return Err(Error::unexpected(
                        "engine closed its event stream without settling",
                    ))
                }
            }
        }
    };

    let bounded = async {
        match timeout {
            Some(after) => tokio::time::timeout(after, work)
                .await
                .unwrap_or(Err(Error::Timeout { after })),
            None => work.await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = bounded => result,
    }
}
