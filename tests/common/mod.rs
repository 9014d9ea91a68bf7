//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedTranscoder`], an in-process engine whose behaviour is
//! scripted per file name and which records what it was asked to do, and
//! helpers to lay out input directories and build an [`AppContext`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchforge::config::Config;
use batchforge::conversion::RunCoordinator;
use batchforge::server::AppContext;
use batchforge::state::AppState;
use batchforge_av::{channel, ProgressEvent, ToolRegistry, TranscodeHandle, Transcoder};
use batchforge_common::{Error, Result};
use parking_lot::Mutex;

/// What the scripted engine does with one file.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report progress, write the output, succeed.
    Succeed,
    /// Report progress, then fail with this message.
    Fail(String),
    /// Never settle until cancelled.
    Hang,
}

/// In-process [`Transcoder`] driven by per-file scripts.
pub struct ScriptedTranscoder {
    scripts: HashMap<String, Script>,
    duration: Duration,
    progress_steps: Vec<f64>,
    started: Mutex<Vec<PathBuf>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedTranscoder {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            duration: Duration::from_millis(20),
            progress_steps: vec![25.0, 50.0, 75.0],
            started: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script a file by name; unscripted files succeed.
    pub fn script(mut self, file_name: &str, script: Script) -> Self {
        self.scripts.insert(file_name.to_string(), script);
        self
    }

    pub fn failing(self, file_name: &str) -> Self {
        self.script(file_name, Script::Fail(format!("{file_name}: exit status 1")))
    }

    /// How long each conversion takes.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_progress_steps(mut self, steps: Vec<f64>) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Inputs in the order the engine was started.
    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().clone()
    }

    pub fn started_names(&self) -> Vec<String> {
        self.started()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect()
    }

    /// Largest number of conversions in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, input: &Path, output: &Path) -> Result<TranscodeHandle> {
        self.started.lock().push(input.to_path_buf());
        let in_flight = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);

        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let script = self.scripts.get(&name).cloned().unwrap_or(Script::Succeed);
        let steps = self.progress_steps.clone();
        let step_delay = self.duration / (steps.len() as u32 + 1);
        let output = output.to_path_buf();
        let active = Arc::clone(&self.active);

        let (reporter, handle) = channel();
        let cancel = reporter.cancellation();

        tokio::spawn(async move {
            let work = async {
                for percent in steps {
                    tokio::time::sleep(step_delay).await;
                    reporter.progress(ProgressEvent::new(percent, None));
                }
                tokio::time::sleep(step_delay).await;
                match script {
                    Script::Succeed => tokio::fs::write(&output, b"converted")
                        .await
                        .map(|_| output.clone())
                        .map_err(Error::from),
                    Script::Fail(message) => Err(Error::tool("scripted", message)),
                    Script::Hang => {
                        std::future::pending::<()>().await;
                        Err(Error::unexpected("unreachable"))
                    }
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = work => result,
            };
            active.fetch_sub(1, Ordering::SeqCst);
            reporter.finish(result).await;
        });

        Ok(handle)
    }
}

/// Create `names` as empty files in `dir`.
pub fn create_inputs<S: AsRef<str>>(dir: &Path, names: &[S]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name.as_ref()), b"source").unwrap();
    }
}

/// `clip01.mxf`, `clip02.mxf`, ...
pub fn clip_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("clip{i:02}.mxf")).collect()
}

/// A config whose conversion directories live under `root`.
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.conversion.input_dir = root.join("input");
    config.conversion.output_dir = root.join("output");
    config
}

/// Build an [`AppContext`] around a scripted engine.
pub fn create_test_context(config: Config, transcoder: Arc<ScriptedTranscoder>) -> AppContext {
    let state = AppState::new();
    let coordinator = RunCoordinator::new(transcoder)
        .with_events(state.event_sender())
        .with_job_timeout(config.conversion.job_timeout());

    AppContext {
        state,
        config: Arc::new(config),
        coordinator: Arc::new(coordinator),
        tools: Arc::new(ToolRegistry::default()),
    }
}
