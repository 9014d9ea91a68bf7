//! Run, batch and job records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use batchforge_common::paths::{normalize_extension, output_path_for};
use batchforge_common::{Error, JobId, Result, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of files converted concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Parameters of one run, resolved from configuration per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub source_extension: String,
    pub target_extension: String,
}

impl RunConfig {
    /// Create a config with the default batch size and `mxf -> mp4`.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            source_extension: "mxf".to_string(),
            target_extension: "mp4".to_string(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_extensions(mut self, source: &str, target: &str) -> Self {
        self.source_extension = source.to_string();
        self.target_extension = target.to_string();
        self
    }

    /// Reject configurations no run can be built from.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(Error::validation("input directory is not set"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::validation("output directory is not set"));
        }
        if self.batch_size == 0 {
            return Err(Error::validation("batch size must be at least 1"));
        }
        let source = normalize_extension(&self.source_extension);
        let target = normalize_extension(&self.target_extension);
        if source.is_empty() || target.is_empty() {
            return Err(Error::validation("source and target extensions must be set"));
        }
        if source == target {
            return Err(Error::validation(format!(
                "source and target extensions are both '{source}'"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One file's conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    input_path: PathBuf,
    output_path: PathBuf,
    pub status: JobStatus,
    pub progress_percent: Option<f64>,
    pub eta_secs: Option<u64>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            input_path,
            output_path,
            status: JobStatus::Queued,
            progress_percent: None,
            eta_secs: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a progress sample. Returns `false` (and changes nothing) when
    /// the sample would move the percentage backwards.
    pub fn update_progress(&mut self, percent: f64, eta_secs: Option<u64>) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        if matches!(self.progress_percent, Some(last) if percent < last) {
            return false;
        }
        self.progress_percent = Some(percent);
        self.eta_secs = eta_secs;
        true
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress_percent = Some(100.0);
        self.eta_secs = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    pub fn cancel(&mut self, reason: &str) {
        self.status = JobStatus::Cancelled;
        self.error = Some(reason.to_string());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    InProgress,
    Completed,
    /// Held the failure that halted the run.
    Failed,
    /// Never started because an earlier batch failed.
    Aborted,
}

/// A group of at most `batch_size` jobs that start together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based.
    pub index: usize,
    pub jobs: Vec<ConversionJob>,
    pub status: BatchStatus,
    pub error: Option<String>,
}

impl Batch {
    pub fn new(index: usize, jobs: Vec<ConversionJob>) -> Self {
        Self {
            index,
            jobs,
            status: BatchStatus::Pending,
            error: None,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Pending,
    Completed,
    Halted,
}

/// The job failure that stopped a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltReason {
    pub batch_index: usize,
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub error: String,
}

impl HaltReason {
    pub fn to_error(&self) -> Error {
        Error::RunHalted {
            batch: self.batch_index,
            input: self.input_path.clone(),
            message: self.error.clone(),
        }
    }
}

/// One invocation's full plan and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub id: RunId,
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub batch_size: usize,
    pub batches: Vec<Batch>,
    pub outcome: RunOutcome,
    pub halted_by: Option<HaltReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    /// Partition `files` (names inside `config.input_dir`) into consecutive
    /// batches of at most `config.batch_size`, preserving order.
    ///
    /// Fails if two inputs would write the same output file, e.g. `a.MXF`
    /// and `a.mxf`.
    pub fn plan<S: AsRef<str>>(files: &[S], config: &RunConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::validation("batch size must be at least 1"));
        }

        let mut claimed: HashMap<PathBuf, &str> = HashMap::with_capacity(files.len());
        for name in files {
            let name = name.as_ref();
            let output = output_path_for(&config.output_dir, name, &config.target_extension);
            if let Some(first) = claimed.insert(output.clone(), name) {
                return Err(Error::validation(format!(
                    "{first} and {name} would both be converted to {}",
                    output.display()
                )));
            }
        }

        let batches = files
            .chunks(config.batch_size)
            .enumerate()
            .map(|(i, chunk)| {
                let jobs = chunk
                    .iter()
                    .map(|name| {
                        let name = name.as_ref();
                        ConversionJob::new(
                            config.input_dir.join(name),
                            output_path_for(&config.output_dir, name, &config.target_extension),
                        )
                    })
                    .collect();
                Batch::new(i + 1, jobs)
            })
            .collect();

        Ok(Self {
            id: RunId::new(),
            input_directory: config.input_dir.clone(),
            output_directory: config.output_dir.clone(),
            batch_size: config.batch_size,
            batches,
            outcome: RunOutcome::Pending,
            halted_by: None,
            started_at: None,
            finished_at: None,
        })
    }

    pub fn jobs(&self) -> impl Iterator<Item = &ConversionJob> {
        self.batches.iter().flat_map(|b| b.jobs.iter())
    }

    pub fn total_jobs(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.iter().map(Batch::len).collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.batches.iter().map(|b| b.count(status)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("clip{i:02}.mxf")).collect()
    }

    #[test]
    fn plan_chunks_in_order() {
        let config = RunConfig::new("in", "out");
        let run = BatchRun::plan(&names(7), &config).unwrap();
        assert_eq!(run.batch_sizes(), vec![5, 2]);
        assert_eq!(run.batches[0].index, 1);
        assert_eq!(run.batches[1].index, 2);
        assert_eq!(
            run.batches[1].jobs[0].input_path(),
            Path::new("in/clip06.mxf")
        );
        assert_eq!(
            run.batches[1].jobs[1].output_path(),
            Path::new("out/clip07.mp4")
        );
        assert_eq!(run.outcome, RunOutcome::Pending);
        assert!(run.jobs().all(|j| j.status == JobStatus::Queued));
    }

    #[test]
    fn plan_batch_counts() {
        for (n, b, expected) in [(0, 5, 0), (1, 5, 1), (5, 5, 1), (6, 5, 2), (10, 3, 4), (4, 1, 4)] {
            let config = RunConfig::new("in", "out").with_batch_size(b);
            let run = BatchRun::plan(&names(n), &config).unwrap();
            assert_eq!(run.batches.len(), expected, "n={n} b={b}");
            assert_eq!(run.total_jobs(), n);
            assert!(run.batches.iter().all(|batch| batch.len() <= b));
        }
    }

    #[test]
    fn plan_rejects_colliding_outputs() {
        let config = RunConfig::new("in", "out");
        let err = BatchRun::plan(&["a.MXF", "a.mxf", "b.mxf"], &config).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let message = err.to_string();
        assert!(message.contains("a.MXF"), "{message}");
        assert!(message.contains("a.mxf"), "{message}");
        assert!(message.contains("a.mp4"), "{message}");
    }

    #[test]
    fn plan_rejects_zero_batch_size() {
        let config = RunConfig::new("in", "out").with_batch_size(0);
        assert!(matches!(
            BatchRun::plan(&names(3), &config),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn run_config_validation() {
        assert!(RunConfig::new("in", "out").validate().is_ok());
        assert!(RunConfig::new("", "out").validate().is_err());
        assert!(RunConfig::new("in", "").validate().is_err());
        assert!(RunConfig::new("in", "out")
            .with_batch_size(0)
            .validate()
            .is_err());
        assert!(RunConfig::new("in", "out")
            .with_extensions("", "mp4")
            .validate()
            .is_err());
        assert!(RunConfig::new("in", "out")
            .with_extensions(".MP4", "mp4")
            .validate()
            .is_err());
    }

    #[test]
    fn job_progress_is_monotonic() {
        let mut job = ConversionJob::new("in/a.mxf".into(), "out/a.mp4".into());
        job.start();
        assert!(job.update_progress(10.0, Some(30)));
        assert!(job.update_progress(40.0, None));
        assert!(!job.update_progress(20.0, Some(5)));
        assert_eq!(job.progress_percent, Some(40.0));
        assert_eq!(job.eta_secs, None);
        assert!(job.update_progress(140.0, None));
        assert_eq!(job.progress_percent, Some(100.0));
    }

    #[test]
    fn job_lifecycle() {
        let mut job = ConversionJob::new("in/a.mxf".into(), "out/a.mp4".into());
        assert!(!job.is_settled());
        job.start();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        job.fail("exit status 1");
        assert!(job.is_settled());
        assert_eq!(job.error.as_deref(), Some("exit status 1"));

        let mut job = ConversionJob::new("in/b.mxf".into(), "out/b.mp4".into());
        job.start();
        job.complete();
        assert_eq!(job.progress_percent, Some(100.0));
        assert!(job.error.is_none());
    }

    #[test]
    fn halt_reason_converts_to_run_halted() {
        let reason = HaltReason {
            batch_index: 2,
            job_id: JobId::new(),
            input_path: "in/b.mxf".into(),
            error: "boom".into(),
        };
        assert!(matches!(
            reason.to_error(),
            Error::RunHalted { batch: 2, .. }
        ));
    }

    #[test]
    fn job_serializes_paths() {
        let job = ConversionJob::new("in/a.mxf".into(), "out/a.mp4".into());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["input_path"], "in/a.mxf");
        assert_eq!(json["output_path"], "out/a.mp4");
        assert_eq!(json["status"], "queued");
    }
}
