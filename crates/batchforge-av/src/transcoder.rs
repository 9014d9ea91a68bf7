//! The transcode adapter contract.
//!
//! A [`Transcoder`] starts one engine invocation and hands back a
//! [`TranscodeHandle`]. The handle yields zero or more
//! [`TranscodeEvent::Progress`] events followed by exactly one terminal event
//! ([`TranscodeEvent::Completed`] or [`TranscodeEvent::Failed`]). The engine
//! side holds the matching [`TranscodeReporter`], whose [`finish`] consumes it,
//! so an engine cannot settle twice.
//!
//! [`finish`]: TranscodeReporter::finish

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchforge_common::{Error, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressEvent;

/// Buffered events per job before progress updates start being dropped.
const EVENT_BUFFER: usize = 64;

/// One event observed on a [`TranscodeHandle`].
#[derive(Debug)]
pub enum TranscodeEvent {
    /// Intermediate progress.
    Progress(ProgressEvent),
    /// Terminal: the output file was written.
    Completed(PathBuf),
    /// Terminal: the engine failed or was cancelled.
    Failed(Error),
}

impl TranscodeEvent {
    /// Whether this event settles the job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscodeEvent::Progress(_))
    }
}

/// An engine capable of converting one file.
///
/// Implementations must not retry internally and must settle every handle
/// they return exactly once.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Engine name used in logs.
    fn name(&self) -> &str;

    /// Start converting `input` into `output`.
    ///
    /// An `Err` means the job never started (e.g. the engine could not be
    /// spawned); once a handle is returned, failures arrive as
    /// [`TranscodeEvent::Failed`].
    async fn start(&self, input: &Path, output: &Path) -> Result<TranscodeHandle>;
}

/// Create a connected reporter/handle pair.
///
/// Engines keep the reporter and return the handle to the caller.
pub fn channel() -> (TranscodeReporter, TranscodeHandle) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    (
        TranscodeReporter {
            events: tx,
            cancel: cancel.clone(),
        },
        TranscodeHandle {
            events: rx,
            cancel,
            settled: false,
        },
    )
}

/// Caller side of a running job.
///
/// Dropping a handle before its terminal event cancels the job.
#[derive(Debug)]
pub struct TranscodeHandle {
    events: mpsc::Receiver<TranscodeEvent>,
    cancel: CancellationToken,
    settled: bool,
}

impl TranscodeHandle {
    /// Receive the next event.
    ///
    /// Returns `None` once the terminal event has been delivered, or if the
    /// engine went away without settling (a contract violation the caller
    /// should treat as an unexpected fault).
    pub async fn next(&mut self) -> Option<TranscodeEvent> {
        if self.settled {
            return None;
        }
        let event = self.events.recv().await?;
        if event.is_terminal() {
            self.settled = true;
        }
        Some(event)
    }

    /// Ask the engine to stop. The engine settles with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drain progress and return the terminal outcome.
    pub async fn wait(mut self) -> Result<PathBuf> {
        while let Some(event) = self.next().await {
            match event {
                TranscodeEvent::Progress(_) => continue,
                TranscodeEvent::Completed(path) => return Ok(path),
                TranscodeEvent::Failed(e) => return Err(e),
            }
        }
        Err(Error::unexpected(
            "engine closed its event stream without settling",
        ))
    }
}

impl Drop for TranscodeHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.cancel.cancel();
        }
    }
}

/// Engine side of a running job.
#[derive(Debug)]
pub struct TranscodeReporter {
    events: mpsc::Sender<TranscodeEvent>,
    cancel: CancellationToken,
}

impl TranscodeReporter {
    /// Publish a progress event. Never blocks: when the caller is not keeping
    /// up the event is dropped.
    pub fn progress(&self, event: ProgressEvent) {
        if self.events.try_send(TranscodeEvent::Progress(event)).is_err() {
            tracing::trace!("Dropped progress event; receiver busy or gone");
        }
    }

    /// Settle the job.
    pub async fn finish(self, result: Result<PathBuf>) {
        let event = match result {
            Ok(path) => TranscodeEvent::Completed(path),
            Err(e) => TranscodeEvent::Failed(e),
        };
        if self.events.send(event).await.is_err() {
            tracing::debug!("Transcode handle dropped before the job settled");
        }
    }

    /// Token cancelled when the caller calls [`TranscodeHandle::cancel`].
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the caller asked the engine to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
