//! ffmpeg engine adapter (H.264/AAC MP4).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use batchforge_common::Result;

use crate::command::ToolCommand;
use crate::process::{spawn_engine, EngineInvocation};
use crate::progress::FfmpegProgressParser;
use crate::transcoder::{TranscodeHandle, Transcoder};

/// Tool name as registered in the [`ToolRegistry`](crate::ToolRegistry).
pub const FFMPEG_TOOL: &str = "ffmpeg";

/// Encoder settings for [`FfmpegTranscoder`].
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    /// libx264 CRF (default: 20).
    pub video_crf: u32,
    /// libx264 preset (default: medium).
    pub video_preset: String,
    /// AAC bitrate (default: 192k).
    pub audio_bitrate: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            video_crf: 20,
            video_preset: "medium".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

/// Converts files with ffmpeg, using ffprobe (when available) to learn the
/// source duration for percentage progress.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    settings: FfmpegSettings,
}

impl FfmpegTranscoder {
    /// Create an adapter around the given executables.
    pub fn new(ffmpeg: PathBuf, ffprobe: Option<PathBuf>, settings: FfmpegSettings) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            settings,
        }
    }

    async fn probe_duration(&self, input: &Path) -> Option<f64> {
        let ffprobe = self.ffprobe.as_ref()?;
        let output = ToolCommand::new(ffprobe.clone())
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .path_arg(input)
            .timeout(Duration::from_secs(30))
            .execute()
            .await;

        match output {
            Ok(out) => out
                .first_line()
                .and_then(|l| l.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0),
            Err(e) => {
                tracing::debug!("ffprobe could not read duration of {:?}: {e}", input);
                None
            }
        }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-y",
            "-progress",
            "pipe:1",
            "-nostats",
            "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(input.to_string_lossy().to_string());
        args.extend(
            [
                "-c:v".to_string(),
                "libx264".to_string(),
                "-crf".to_string(),
                self.settings.video_crf.to_string(),
                "-preset".to_string(),
                self.settings.video_preset.clone(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                self.settings.audio_bitrate.clone(),
                "-movflags".to_string(),
                "+faststart".to_string(),
            ],
        );
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        FFMPEG_TOOL
    }

    async fn start(&self, input: &Path, output: &Path) -> Result<TranscodeHandle> {
        let duration = self.probe_duration(input).await;

        tracing::info!(
            "ffmpeg encode: {:?} -> {:?} (crf={}, preset={}, duration={:?})",
            input,
            output,
            self.settings.video_crf,
            self.settings.video_preset,
            duration,
        );

        spawn_engine(
            EngineInvocation {
                tool: FFMPEG_TOOL.to_string(),
                program: self.ffmpeg.clone(),
                args: self.build_args(input, output),
                output: output.to_path_buf(),
            },
            FfmpegProgressParser::new(duration),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = FfmpegSettings::default();
        assert_eq!(settings.video_crf, 20);
        assert_eq!(settings.video_preset, "medium");
        assert_eq!(settings.audio_bitrate, "192k");
    }

    #[test]
    fn args_route_progress_to_stdout() {
        let ff = FfmpegTranscoder::new(PathBuf::from("ffmpeg"), None, FfmpegSettings::default());
        let args = ff.build_args(Path::new("in/a.mxf"), Path::new("out/a.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-progress pipe:1 -nostats"));
        assert!(joined.contains("-i in/a.mxf"));
        assert!(joined.contains("-crf 20"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("out/a.mp4"));
    }

    #[tokio::test]
    async fn no_ffprobe_means_unknown_duration() {
        let ff = FfmpegTranscoder::new(PathBuf::from("ffmpeg"), None, FfmpegSettings::default());
        assert_eq!(ff.probe_duration(Path::new("a.mxf")).await, None);
    }
}
