//! Batch conversion.
//!
//! A run converts every matching file in an input directory:
//!
//! - [`resolver`] lists the source files
//! - [`BatchRun::plan`] partitions them into fixed-size batches
//! - [`BatchDispatcher`] runs each batch concurrently behind a fail-fast
//!   barrier
//! - [`RunCoordinator`] serializes runs per directory pair and produces a
//!   [`RunReport`]

mod coordinator;
mod dispatcher;
mod model;
mod report;
pub mod resolver;

pub use coordinator::RunCoordinator;
pub use dispatcher::BatchDispatcher;
pub use model::{
    Batch, BatchRun, BatchStatus, ConversionJob, HaltReason, JobStatus, RunConfig, RunOutcome,
    DEFAULT_BATCH_SIZE,
};
pub use report::{RunReport, RunSummary};
