//! Run coordinator: one invocation from configuration to report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use batchforge_av::Transcoder;
use batchforge_common::{Error, Result};
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

use super::dispatcher::BatchDispatcher;
use super::model::RunConfig;
use super::report::RunReport;
use super::resolver;
use crate::state::AppEvent;

type RunKey = (PathBuf, PathBuf);

/// Absolute, lexically normalized form of a run directory, so `in`, `./in`
/// and `/cwd/in/` share one lock.
fn lock_path(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .components()
        .collect()
}

fn run_key(config: &RunConfig) -> RunKey {
    (lock_path(&config.input_dir), lock_path(&config.output_dir))
}

/// Held for the duration of a run. Releasing it drops the map entry unless
/// another caller still holds the lock's `Arc`.
struct RunLease<'a> {
    locks: &'a DashMap<RunKey, Arc<Mutex<()>>>,
    key: RunKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Serializes runs per input/output directory pair and drives each run
/// through resolve, dispatch and report.
pub struct RunCoordinator {
    dispatcher: BatchDispatcher,
    locks: DashMap<RunKey, Arc<Mutex<()>>>,
}

impl RunCoordinator {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(transcoder),
            locks: DashMap::new(),
        }
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<AppEvent>) -> Self {
        self.dispatcher = self.dispatcher.with_events(event_tx);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatcher = self.dispatcher.with_job_timeout(timeout);
        self
    }

    /// Whether a run currently holds the given directory pair.
    pub fn is_running(&self, config: &RunConfig) -> bool {
        self.locks
            .get(&run_key(config))
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Execute one run.
    ///
    /// A halted run is returned as `Ok`; use [`RunReport::halt_error`] to
    /// surface it. `Err` means no batch ran: invalid config, another run on
    /// the same directories, or a filesystem failure before dispatch.
    pub async fn invoke(&self, config: &RunConfig) -> Result<RunReport> {
        config.validate()?;

        let key = run_key(config);
        let lock = Arc::clone(&self.locks.entry(key.clone()).or_default());
        let guard = lock.try_lock_owned().map_err(|_| Error::RunInProgress {
            input: config.input_dir.clone(),
            output: config.output_dir.clone(),
        })?;
        let _lease = RunLease {
            locks: &self.locks,
            key,
            guard: Some(guard),
        };

        let started = Instant::now();
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let files = resolver::resolve(&config.input_dir, &config.source_extension).await?;
        tracing::info!(
            input = %config.input_dir.display(),
            output = %config.output_dir.display(),
            files = files.len(),
            "Resolved files for conversion"
        );

        let run = self.dispatcher.run(&files, config).await?;
        Ok(RunReport::new(run, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use batchforge_av::TranscodeHandle;

    /// Writes the output file as soon as it is started.
    struct Touch;

    #[async_trait]
    impl Transcoder for Touch {
        fn name(&self) -> &str {
            "touch"
        }

        async fn start(&self, _input: &Path, output: &Path) -> Result<TranscodeHandle> {
            tokio::fs::write(output, b"mp4").await?;
            let (reporter, handle) = batchforge_av::channel();
            reporter.finish(Ok(output.to_path_buf())).await;
            Ok(handle)
        }
    }

    #[tokio::test]
    async fn creates_output_dir_and_converts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("a.mxf"), b"x").unwrap();
        std::fs::write(input.join("skip.txt"), b"x").unwrap();
        let output = dir.path().join("nested/out");

        let coordinator = RunCoordinator::new(Arc::new(Touch));
        let report = coordinator
            .invoke(&RunConfig::new(&input, &output))
            .await
            .unwrap();

        assert!(report.is_completed());
        assert_eq!(report.summary.total_files, 1);
        assert!(output.join("a.mp4").exists());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let coordinator = RunCoordinator::new(Arc::new(Touch));
        let config = RunConfig::new(dir.path(), &output).with_batch_size(0);

        let err = coordinator.invoke(&config).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unreadable_input_fails_before_any_batch() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RunCoordinator::new(Arc::new(Touch));
        let config = RunConfig::new(dir.path().join("missing"), dir.path().join("out"));

        let err = coordinator.invoke(&config).await.unwrap_err();
        assert!(matches!(err, Error::DirectoryUnreadable { .. }));
        assert!(!coordinator.is_running(&config));
        assert!(coordinator.locks.is_empty());
    }

    #[test]
    fn equivalent_spellings_share_a_key() {
        let cwd = std::env::current_dir().unwrap();
        let a = RunConfig::new("in", "out");
        let b = RunConfig::new("./in/", cwd.join("out/."));
        assert_eq!(run_key(&a), run_key(&b));
        assert_eq!(run_key(&a).0, cwd.join("in"));
    }

    #[tokio::test]
    async fn finished_runs_release_their_lock_entry() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir(&input).unwrap();
        std::fs::write(input.join("a.mxf"), b"x").unwrap();

        let coordinator = RunCoordinator::new(Arc::new(Touch));
        for _ in 0..3 {
            let report = coordinator
                .invoke(&RunConfig::new(&input, dir.path().join("out")))
                .await
                .unwrap();
            assert!(report.is_completed());
            assert!(coordinator.locks.is_empty());
        }
    }
}
