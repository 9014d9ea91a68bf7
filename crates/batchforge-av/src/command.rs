//! One-shot helper invocations (`ffprobe` and friends).
//!
//! Encodes are supervised by the engine adapters; a [`ToolCommand`] is for
//! short calls whose whole output is read at once, bounded by a timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use batchforge_common::{Error, Result};
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lines of stderr quoted in a failure message.
const STDERR_LINES: usize = 5;

/// Captured result of a successful invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    /// First non-empty stdout line, trimmed.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Owned builder for a helper invocation.
///
/// ```no_run
/// use batchforge_av::ToolCommand;
///
/// # async fn example() -> batchforge_common::Result<()> {
/// let out = ToolCommand::new("ffprobe")
///     .args(["-v", "error", "-show_entries", "format=duration"])
///     .arg("/ingest/reel1.mxf")
///     .execute()
///     .await?;
/// println!("{:?}", out.first_line());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument (lossy on non-UTF-8 paths).
    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name used in errors: the executable's file name.
    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion.
    ///
    /// Spawn failures, a non-zero exit (with the stderr tail) and an elapsed
    /// timeout all surface as [`Error::Tool`]. A timed-out child is killed.
    pub async fn execute(self) -> Result<ToolOutput> {
        let tool = self.tool_name();
        tracing::trace!(tool = %tool, args = ?self.args, "Running helper tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool(&tool, format!("failed to spawn: {e}")))?;

        let started = Instant::now();
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::tool(&tool, format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::tool(&tool, format!("wait failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(Error::tool(
                &tool,
                format!("{}: {}", output.status, tail.join(" | ")),
            ));
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }
}
