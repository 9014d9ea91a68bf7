//! Supervision of one engine child process.
//!
//! The supervisor task reads progress from stdout, keeps the tail of stderr
//! for error messages, kills the child on cancellation, and settles the
//! [`TranscodeReporter`] exactly once.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use batchforge_common::{Error, Result};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio_util::codec::FramedRead;

use crate::progress::{EngineLineCodec, ProgressParser};
use crate::transcoder::{self, TranscodeHandle, TranscodeReporter};

/// Stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 12;

/// A fully resolved engine command line.
#[derive(Debug, Clone)]
pub(crate) struct EngineInvocation {
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub output: PathBuf,
}

/// Spawn the engine and return a handle to its event stream.
pub(crate) fn spawn_engine<P: ProgressParser>(
    invocation: EngineInvocation,
    parser: P,
) -> Result<TranscodeHandle> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::tool(&invocation.tool, format!("failed to spawn: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::unexpected("engine stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::unexpected("engine stderr was not captured"))?;

    tracing::debug!(
        tool = %invocation.tool,
        pid = ?child.id(),
        "Engine process spawned"
    );

    let (reporter, handle) = transcoder::channel();
    tokio::spawn(supervise(child, stdout, stderr, invocation, parser, reporter));
    Ok(handle)
}

async fn supervise<O, E, P>(
    mut child: Child,
    stdout: O,
    stderr: E,
    invocation: EngineInvocation,
    mut parser: P,
    reporter: TranscodeReporter,
) where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
    P: ProgressParser,
{
    let tail = tokio::spawn(collect_tail(stderr, invocation.tool.clone()));
    let cancel = reporter.cancellation();
    let mut lines = FramedRead::new(stdout, EngineLineCodec);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                abort(&mut child, &invocation).await;
                reporter.finish(Err(Error::Cancelled)).await;
                return;
            }
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if let Some(event) = parser.parse_line(&line) {
                        reporter.progress(event);
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(tool = %invocation.tool, "Stopped reading engine stdout: {e}");
                    break;
                }
                None => break,
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            abort(&mut child, &invocation).await;
            reporter.finish(Err(Error::Cancelled)).await;
            return;
        }
        status = child.wait() => status,
    };

    let stderr_tail = tail.await.unwrap_or_default();
    let result = settle(status, &invocation, &stderr_tail).await;
    reporter.finish(result).await;
}

async fn settle(
    status: std::io::Result<ExitStatus>,
    invocation: &EngineInvocation,
    stderr_tail: &str,
) -> Result<PathBuf> {
    match status {
        Ok(status) if status.success() => {
            // HandBrakeCLI exits 0 for some failures (e.g. no valid title).
            if tokio::fs::try_exists(&invocation.output).await.unwrap_or(false) {
                Ok(invocation.output.clone())
            } else {
                Err(Error::tool(
                    &invocation.tool,
                    format!("exited successfully but wrote no output: {stderr_tail}"),
                ))
            }
        }
        Ok(status) => {
            discard_partial(&invocation.output).await;
            Err(Error::tool(
                &invocation.tool,
                format!("exited with status {status}: {stderr_tail}"),
            ))
        }
        Err(e) => {
            discard_partial(&invocation.output).await;
            Err(Error::tool(
                &invocation.tool,
                format!("I/O error waiting for process: {e}"),
            ))
        }
    }
}

async fn abort(child: &mut Child, invocation: &EngineInvocation) {
    if let Err(e) = child.kill().await {
        tracing::warn!(tool = %invocation.tool, "Failed to kill engine process: {e}");
    }
    discard_partial(&invocation.output).await;
}

async fn discard_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::debug!(output = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(output = %output.display(), "Failed to remove partial output: {e}"),
    }
}

async fn collect_tail<E>(stderr: E, tool: String) -> String
where
    E: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(stderr, EngineLineCodec);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Some(Ok(line)) = lines.next().await {
        tracing::trace!(tool = %tool, "{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join(" | ")
}
