//! # batchforge
//!
//! Batch media conversion: resolve a directory of source files, convert them
//! through an external engine in fixed-size concurrent batches, and stop at
//! the first batch that contains a failure.
//!
//! The engine adapters live in `batchforge-av`; shared errors and ids in
//! `batchforge-common`.

pub mod config;
pub mod conversion;
pub mod server;
pub mod state;
