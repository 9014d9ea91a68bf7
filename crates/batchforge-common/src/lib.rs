//! Batchforge-Common: Shared types and utilities.
//!
//! This crate provides functionality used by every batchforge crate:
//!
//! - **Error Handling**: the run/job error taxonomy and a result alias
//! - **Typed IDs**: Type-safe UUID wrappers for runs and jobs
//! - **Path Utilities**: extension matching and output path derivation
//!
//! # Examples
//!
//! ```
//! use batchforge_common::{Error, JobId, Result};
//! use batchforge_common::paths::has_extension;
//! use std::path::Path;
//!
//! let job_id = JobId::new();
//! assert!(has_extension(Path::new("clip.MXF"), "mxf"));
//!
//! fn example() -> Result<()> {
//!     Err(Error::validation("batch size must be at least 1"))
//! }
//! assert!(example().is_err());
//! # let _ = job_id;
//! ```

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{Error, Result};
pub use ids::*;
