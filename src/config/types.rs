use batchforge_av::{EngineKind, EngineSettings, FfmpegSettings, ToolsConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversion::{RunConfig, DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Directory relative paths are resolved against (the config file's
    /// directory when loaded from disk).
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Config {
    /// Base directory for relative paths, falling back to the working
    /// directory.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Run parameters with directories resolved against [`Self::base_dir`].
    pub fn run_config(&self) -> RunConfig {
        self.conversion.run_config(&self.base_dir())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Files converted concurrently per batch (default: 5)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    #[serde(default = "default_target_extension")]
    pub target_extension: String,

    #[serde(default)]
    pub engine: EngineKind,

    /// Per-job time budget in seconds; 0 disables it
    #[serde(default)]
    pub job_timeout_secs: u64,

    /// HandBrake preset name
    #[serde(default)]
    pub preset: Option<String>,

    /// ffmpeg CRF (default: 20)
    #[serde(default = "default_video_crf")]
    pub video_crf: u32,

    /// ffmpeg x264 preset (default: medium)
    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    /// ffmpeg AAC bitrate (default: 192k)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("input")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_source_extension() -> String {
    "mxf".to_string()
}
fn default_target_extension() -> String {
    "mp4".to_string()
}
fn default_video_crf() -> u32 {
    20
}
fn default_video_preset() -> String {
    "medium".to_string()
}
fn default_audio_bitrate() -> String {
    "192k".to_string()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            batch_size: default_batch_size(),
            source_extension: default_source_extension(),
            target_extension: default_target_extension(),
            engine: EngineKind::default(),
            job_timeout_secs: 0,
            preset: None,
            video_crf: default_video_crf(),
            video_preset: default_video_preset(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl ConversionConfig {
    pub fn run_config(&self, base: &Path) -> RunConfig {
        RunConfig {
            input_dir: resolve_dir(base, &self.input_dir),
            output_dir: resolve_dir(base, &self.output_dir),
            batch_size: self.batch_size,
            source_extension: self.source_extension.clone(),
            target_extension: self.target_extension.clone(),
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            handbrake_preset: self.preset.clone(),
            ffmpeg: FfmpegSettings {
                video_crf: self.video_crf,
                video_preset: self.video_preset.clone(),
                audio_bitrate: self.audio_bitrate.clone(),
            },
        }
    }
}

fn resolve_dir(base: &Path, dir: &Path) -> PathBuf {
    if dir.as_os_str().is_empty() || dir.is_absolute() {
        return dir.to_path_buf();
    }
    let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
    let expanded = PathBuf::from(expanded);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
