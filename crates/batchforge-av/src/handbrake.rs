//! HandBrakeCLI engine adapter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchforge_common::Result;

use crate::process::{spawn_engine, EngineInvocation};
use crate::progress::HandBrakeProgressParser;
use crate::transcoder::{TranscodeHandle, Transcoder};

/// Tool name as registered in the [`ToolRegistry`](crate::ToolRegistry).
pub const HANDBRAKE_TOOL: &str = "HandBrakeCLI";

/// Converts files with `HandBrakeCLI -i <input> -o <output>`.
#[derive(Debug, Clone)]
pub struct HandBrakeTranscoder {
    program: PathBuf,
    preset: Option<String>,
}

impl HandBrakeTranscoder {
    /// Create an adapter around the given executable.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            preset: None,
        }
    }

    /// Encode with a named HandBrake preset instead of the CLI defaults.
    pub fn with_preset(mut self, preset: Option<String>) -> Self {
        self.preset = preset.filter(|p| !p.trim().is_empty());
        self
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];
        if let Some(ref preset) = self.preset {
            args.push("--preset".to_string());
            args.push(preset.clone());
        }
        args
    }
}

#[async_trait]
impl Transcoder for HandBrakeTranscoder {
    fn name(&self) -> &str {
        HANDBRAKE_TOOL
    }

    async fn start(&self, input: &Path, output: &Path) -> Result<TranscodeHandle> {
        tracing::info!(
            "HandBrake encode: {:?} -> {:?} (preset={:?})",
            input,
            output,
            self.preset
        );

        spawn_engine(
            EngineInvocation {
                tool: HANDBRAKE_TOOL.to_string(),
                program: self.program.clone(),
                args: self.build_args(input, output),
                output: output.to_path_buf(),
            },
            HandBrakeProgressParser,
        )
    }
}
