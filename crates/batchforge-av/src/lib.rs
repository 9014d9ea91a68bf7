//! # batchforge-av
//!
//! Transcoding engine adapters for the batchforge dispatcher.
//!
//! This crate provides:
//!
//! - **The adapter contract** ([`Transcoder`], [`TranscodeHandle`]) -- start a
//!   job, observe a lazy stream of progress events, then exactly one terminal
//!   event.
//! - **Engines** ([`HandBrakeTranscoder`], [`FfmpegTranscoder`]) -- implement
//!   the contract by supervising an external CLI process.
//! - **Progress parsing** ([`progress`]) -- turn engine console output into
//!   percent/ETA events.
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache engine paths.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short helper invocations such as `ffprobe`.

pub mod command;
pub mod engine;
pub mod ffmpeg;
pub mod handbrake;
pub mod progress;
mod process;
pub mod tools;
pub mod transcoder;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use engine::{build_transcoder, EngineKind, EngineSettings};
pub use ffmpeg::{FfmpegSettings, FfmpegTranscoder};
pub use handbrake::HandBrakeTranscoder;
pub use progress::ProgressEvent;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, ToolsConfig};
pub use transcoder::{channel, TranscodeEvent, TranscodeHandle, TranscodeReporter, Transcoder};
