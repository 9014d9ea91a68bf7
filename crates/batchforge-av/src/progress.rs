//! Progress parsing for engine console output.
//!
//! Engines report progress on stdout. HandBrakeCLI rewrites a single status
//! line using carriage returns; ffmpeg (with `-progress pipe:1`) prints
//! `key=value` blocks terminated by `progress=continue|end`. Both are read
//! through [`EngineLineCodec`], which splits on either line terminator.

use std::sync::OnceLock;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use regex::Regex;
use serde::Serialize;
use tokio_util::codec::Decoder;

/// Longest line kept before the codec flushes it unterminated.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// One progress observation for a running job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Overall completion, 0.0..=100.0.
    pub percent: f64,
    /// Estimated time remaining, when the engine reports one.
    #[serde(rename = "eta_secs", with = "opt_duration_secs")]
    pub eta: Option<Duration>,
}

impl ProgressEvent {
    /// Create an event, clamping `percent` into 0..=100.
    pub fn new(percent: f64, eta: Option<Duration>) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self { percent, eta }
    }
}

mod opt_duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }
}

/// Turns engine output lines into progress events.
pub trait ProgressParser: Send + 'static {
    /// Feed one line; returns an event when the line completes an observation.
    fn parse_line(&mut self, line: &str) -> Option<ProgressEvent>;
}

fn handbrake_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"Encoding: task (\d+) of (\d+), (\d+(?:\.\d+)?) %(?:.*?ETA (\d+)h(\d+)m(\d+)s)?",
        )
        .expect("valid HandBrake progress regex")
    })
}

/// Parser for HandBrakeCLI status lines such as
/// `Encoding: task 1 of 2, 45.20 % (87.11 fps, avg 90.02 fps, ETA 00h01m03s)`.
///
/// Multi-pass encodes run several tasks; their percentages are folded into a
/// single 0..=100 value across all tasks.
#[derive(Debug, Default)]
pub struct HandBrakeProgressParser;

impl ProgressParser for HandBrakeProgressParser {
    fn parse_line(&mut self, line: &str) -> Option<ProgressEvent> {
        let caps = handbrake_regex().captures(line)?;
        let task: f64 = caps.get(1)?.as_str().parse().ok()?;
        let total: f64 = caps.get(2)?.as_str().parse().ok()?;
        let pct: f64 = caps.get(3)?.as_str().parse().ok()?;
        if total < 1.0 || task < 1.0 {
            return None;
        }

        let overall = ((task - 1.0) * 100.0 + pct) / total;

        let eta = match (caps.get(4), caps.get(5), caps.get(6)) {
            (Some(h), Some(m), Some(s)) => {
                let h: u64 = h.as_str().parse().ok()?;
                let m: u64 = m.as_str().parse().ok()?;
                let s: u64 = s.as_str().parse().ok()?;
                Some(Duration::from_secs(h * 3600 + m * 60 + s))
            }
            _ => None,
        };

        Some(ProgressEvent::new(overall, eta))
    }
}

/// Parser for `ffmpeg -progress` key/value blocks.
///
/// Percent needs the source duration; without it no events are produced.
#[derive(Debug, Default)]
pub struct FfmpegProgressParser {
    duration_secs: Option<f64>,
    out_time_us: Option<i64>,
    speed: Option<f64>,
}

impl FfmpegProgressParser {
    /// Create a parser for a source of the given duration.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            ..Self::default()
        }
    }
}

impl ProgressParser for FfmpegProgressParser {
    fn parse_line(&mut self, line: &str) -> Option<ProgressEvent> {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        match key.trim() {
            // ffmpeg reports `out_time_ms` in microseconds as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = Some(us);
                }
                None
            }
            "speed" => {
                self.speed = value.trim_end_matches('x').parse::<f64>().ok();
                None
            }
            "progress" => {
                let duration = self.duration_secs?;
                let elapsed = self.out_time_us? as f64 / 1_000_000.0;
                let percent = if value == "end" {
                    100.0
                } else {
                    elapsed / duration * 100.0
                };
                let eta = self
                    .speed
                    .filter(|s| *s > 0.0)
                    .and_then(|speed| {
                        Duration::try_from_secs_f64((duration - elapsed).max(0.0) / speed).ok()
                    });
                Some(ProgressEvent::new(percent, eta))
            }
            _ => None,
        }
    }
}

/// Splits a byte stream into lines on `\n` or `\r`, skipping empty lines.
#[derive(Debug, Default)]
pub struct EngineLineCodec;

impl Decoder for EngineLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let Some(pos) = buf.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                if buf.len() > MAX_LINE_BYTES {
                    let line = buf.split_to(buf.len());
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                return Ok(None);
            };

            let line = buf.split_to(pos);
            buf.advance(1);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(&line).trim_end().to_string()));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(String::from_utf8_lossy(&line).trim_end().to_string()))
    }
}
