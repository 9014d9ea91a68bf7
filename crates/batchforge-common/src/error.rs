//! Error taxonomy shared by the dispatcher, the engine adapters and the HTTP
//! boundary.
//!
//! Every failure a run can produce funnels into [`Error`], which carries enough
//! context for the server to derive a status code via [`Error::http_status`].

use std::path::PathBuf;
use std::time::Duration;

/// Unified error type for batchforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input directory could not be listed. Aborts a run before any batch
    /// is built.
    #[error("Input directory unreadable: {}: {source}", path.display())]
    DirectoryUnreadable {
        /// Directory that failed to list.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A single conversion failed.
    #[error("Conversion failed for {}: {message}", input.display())]
    JobFailure {
        /// Source file of the failed job.
        input: PathBuf,
        /// Engine-reported failure.
        message: String,
    },

    /// A job failure stopped the run before every batch completed.
    #[error("Run halted in batch {batch} at {}: {message}", input.display())]
    RunHalted {
        /// 1-based index of the batch holding the triggering failure.
        batch: usize,
        /// Source file of the triggering job.
        input: PathBuf,
        /// The triggering failure.
        message: String,
    },

    /// Anything the taxonomy above does not anticipate, such as an adapter
    /// that closes its event stream without settling.
    #[error("Unexpected fault: {0}")]
    UnexpectedFault(String),

    /// A job exceeded its time budget.
    #[error("Timed out after {after:?}")]
    Timeout {
        /// The budget that elapsed.
        after: Duration,
    },

    /// The job was cancelled before it settled.
    #[error("Cancelled")]
    Cancelled,

    /// Another run currently holds the same input/output directories.
    #[error(
        "A run is already in progress for {} -> {}",
        input.display(),
        output.display()
    )]
    RunInProgress {
        /// Input directory of the conflicting run.
        input: PathBuf,
        /// Output directory of the conflicting run.
        output: PathBuf,
    },

    /// Configuration or request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external engine is missing or exited unsuccessfully.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::RunInProgress { .. } => 409,
            Error::JobFailure { .. } | Error::Tool { .. } => 502,
            Error::Timeout { .. } => 504,
            Error::DirectoryUnreadable { .. }
            | Error::RunHalted { .. }
            | Error::UnexpectedFault(_)
            | Error::Cancelled
            | Error::Io { .. } => 500,
        }
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::DirectoryUnreadable { .. } => "directory_unreadable",
            Error::JobFailure { .. } => "job_failure",
            Error::RunHalted { .. } => "run_halted",
            Error::UnexpectedFault(_) => "unexpected_fault",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::RunInProgress { .. } => "run_in_progress",
            Error::Validation(_) => "validation_error",
            Error::Tool { .. } => "tool_error",
            Error::Io { .. } => "io_error",
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::UnexpectedFault`].
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Error::UnexpectedFault(msg.into())
    }

    /// Convenience constructor for [`Error::JobFailure`].
    pub fn job_failure(input: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::JobFailure {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
