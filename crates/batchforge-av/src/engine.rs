//! Engine selection.

use std::fmt;
use std::sync::Arc;

use batchforge_common::Result;
use serde::{Deserialize, Serialize};

use crate::ffmpeg::{FfmpegSettings, FfmpegTranscoder, FFMPEG_TOOL};
use crate::handbrake::{HandBrakeTranscoder, HANDBRAKE_TOOL};
use crate::tools::ToolRegistry;
use crate::transcoder::Transcoder;

/// Which external engine performs conversions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// HandBrakeCLI.
    #[default]
    #[serde(alias = "handbrakecli")]
    Handbrake,
    /// ffmpeg (+ ffprobe for progress).
    Ffmpeg,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handbrake => write!(f, "handbrake"),
            Self::Ffmpeg => write!(f, "ffmpeg"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "handbrake" | "handbrakecli" => Ok(Self::Handbrake),
            "ffmpeg" => Ok(Self::Ffmpeg),
            other => Err(format!("unknown engine '{other}' (expected handbrake or ffmpeg)")),
        }
    }
}

/// Engine-specific knobs, gathered from configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// HandBrake preset name.
    pub handbrake_preset: Option<String>,
    /// ffmpeg encoder settings.
    pub ffmpeg: FfmpegSettings,
}

/// Build the transcoder for `kind` from the discovered tools.
///
/// Fails with a tool error when the engine executable was not found.
pub fn build_transcoder(
    kind: EngineKind,
    tools: &ToolRegistry,
    settings: &EngineSettings,
) -> Result<Arc<dyn Transcoder>> {
    match kind {
        EngineKind::Handbrake => {
            let hb = tools.require(HANDBRAKE_TOOL)?;
            Ok(Arc::new(
                HandBrakeTranscoder::new(hb.path.clone())
                    .with_preset(settings.handbrake_preset.clone()),
            ))
        }
        EngineKind::Ffmpeg => {
            let ffmpeg = tools.require(FFMPEG_TOOL)?;
            let ffprobe = tools.get("ffprobe").map(|t| t.path.clone());
            if ffprobe.is_none() {
                tracing::warn!("ffprobe not found; conversions will not report progress");
            }
            Ok(Arc::new(FfmpegTranscoder::new(
                ffmpeg.path.clone(),
                ffprobe,
                settings.ffmpeg.clone(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_parsing() {
        assert_eq!("handbrake".parse::<EngineKind>().unwrap(), EngineKind::Handbrake);
        assert_eq!("HandBrakeCLI".parse::<EngineKind>().unwrap(), EngineKind::Handbrake);
        assert_eq!("FFMPEG".parse::<EngineKind>().unwrap(), EngineKind::Ffmpeg);
        assert!("vlc".parse::<EngineKind>().is_err());
    }

    #[test]
    fn engine_kind_serde() {
        let kind: EngineKind = serde_json::from_str("\"ffmpeg\"").unwrap();
        assert_eq!(kind, EngineKind::Ffmpeg);
        assert_eq!(serde_json::to_string(&EngineKind::Handbrake).unwrap(), "\"handbrake\"");
        assert_eq!(EngineKind::default(), EngineKind::Handbrake);
    }

    #[test]
    fn missing_engine_is_tool_error() {
        let tools = ToolRegistry::default();
        let settings = EngineSettings::default();
        assert!(build_transcoder(EngineKind::Handbrake, &tools, &settings).is_err());
        assert!(build_transcoder(EngineKind::Ffmpeg, &tools, &settings).is_err());
    }
}
