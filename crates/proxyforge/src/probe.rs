//! Metadata probing through exiftool and ffprobe.
//!
//! The classifier and the encode invoker only need a handful of facts about a
//! source: device tags, whether the frame rate is variable, and what the first
//! audio stream looks like. Parsing is kept separate from process execution so
//! it can be tested against captured tool output.

use proxyforge_config::ToolsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe tool exited unsuccessfully.
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// Failed to parse tool JSON output.
    #[error("Failed to parse probe output: {0}")]
    ParseError(String),

    /// IO error while launching the tool.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device-related metadata for one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// `Make` tag, if present
    pub make: Option<String>,
    /// `Model` tag, if present
    pub model: Option<String>,
    /// `AndroidVersion` tag, if present
    pub android_version: Option<String>,
    /// Whether the first video stream has a variable frame rate
    pub variable_frame_rate: bool,
}

/// First audio stream of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec_name: String,
    pub bit_rate: Option<u64>,
    pub sample_rate: Option<u32>,
}

/// Source of device metadata for classification.
pub trait MetadataProbe {
    fn probe(&self, path: &Path) -> Result<DeviceMetadata, ProbeError>;

    /// Whether `path` has a decodable video stream. Used to tell real proxies
    /// from truncated leftovers of an interrupted encode.
    fn has_video_stream(&self, path: &Path) -> Result<bool, ProbeError>;
}

/// Probe backed by the external exiftool and ffprobe executables.
#[derive(Debug, Clone)]
pub struct ToolProbe {
    exiftool: String,
    ffprobe: String,
}

impl ToolProbe {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            exiftool: tools.exiftool.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }
}

impl MetadataProbe for ToolProbe {
    fn probe(&self, path: &Path) -> Result<DeviceMetadata, ProbeError> {
        let exif = run_tool(Command::new(&self.exiftool).arg("-json").arg(path), &self.exiftool)?;
        let mut metadata = parse_exiftool_output(&exif)?;

        let frame_rates = run_tool(
            Command::new(&self.ffprobe)
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=r_frame_rate,avg_frame_rate",
                    "-of",
                    "json",
                ])
                .arg(path),
            &self.ffprobe,
        )?;
        metadata.variable_frame_rate = parse_frame_rate_output(&frame_rates)?;

        Ok(metadata)
    }

    fn has_video_stream(&self, path: &Path) -> Result<bool, ProbeError> {
        let stdout = run_tool(
            Command::new(&self.ffprobe)
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height,codec_name",
                    "-of",
                    "json",
                ])
                .arg(path),
            &self.ffprobe,
        )?;
        parse_video_stream_output(&stdout)
    }
}

fn run_tool(cmd: &mut Command, tool: &str) -> Result<String, ProbeError> {
    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::ToolFailed {
            tool: tool.to_string(),
            message: format!("exited with status {}: {}", output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probes the first audio stream of a file with ffprobe.
///
/// Returns `Ok(None)` when the file has no audio stream.
pub fn probe_audio(ffprobe: &str, path: &Path) -> Result<Option<AudioInfo>, ProbeError> {
    let stdout = run_tool(
        Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=codec_name,bit_rate,sample_rate",
                "-of",
                "json",
            ])
            .arg(path),
        ffprobe,
    )?;
    parse_audio_output(&stdout)
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_name: Option<String>,
        pub r_frame_rate: Option<String>,
        pub avg_frame_rate: Option<String>,
        pub bit_rate: Option<String>,
        pub sample_rate: Option<String>,
    }
}

/// Parses `exiftool -json` output (an array with one object per file).
pub fn parse_exiftool_output(json_str: &str) -> Result<DeviceMetadata, ProbeError> {
    let entries: Vec<HashMap<String, serde_json::Value>> =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;
    let tags = entries
        .into_iter()
        .next()
        .ok_or_else(|| ProbeError::ParseError("exiftool returned no entries".to_string()))?;

    let text = |key: &str| -> Option<String> {
        tags.get(key).and_then(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    Ok(DeviceMetadata {
        make: text("Make"),
        model: text("Model"),
        android_version: text("AndroidVersion"),
        variable_frame_rate: false,
    })
}

/// Parses a frame rate such as `30000/1001` or `25`.
pub fn parse_rational(s: &str) -> Option<f64> {
    let s = s.trim();
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Relative tolerance between nominal and average frame rate.
const VFR_TOLERANCE: f64 = 0.01;

/// Parses ffprobe frame-rate output and reports whether the rate is variable.
///
/// A stream is considered variable when its average frame rate deviates from
/// the nominal (`r_frame_rate`) rate by more than 1%. Files without a video
/// stream or without usable rates report `false`.
pub fn parse_frame_rate_output(json_str: &str) -> Result<bool, ProbeError> {
    let output: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let Some(stream) = output.streams.unwrap_or_default().into_iter().next() else {
        return Ok(false);
    };

    let nominal = stream.r_frame_rate.as_deref().and_then(parse_rational);
    let average = stream.avg_frame_rate.as_deref().and_then(parse_rational);

    Ok(match (nominal, average) {
        (Some(r), Some(avg)) => ((r - avg).abs() / r) > VFR_TOLERANCE,
        _ => false,
    })
}

/// Parses ffprobe video-stream output; true when at least one stream is listed.
pub fn parse_video_stream_output(json_str: &str) -> Result<bool, ProbeError> {
    let output: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;
    Ok(output.streams.is_some_and(|streams| !streams.is_empty()))
}

/// Parses ffprobe audio-stream output.
pub fn parse_audio_output(json_str: &str) -> Result<Option<AudioInfo>, ProbeError> {
    let output: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    Ok(output
        .streams
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|stream| AudioInfo {
            codec_name: stream
                .codec_name
                .unwrap_or_else(|| "unknown".to_string())
                .to_lowercase(),
            bit_rate: stream.bit_rate.and_then(|b| b.parse().ok()),
            sample_rate: stream.sample_rate.and_then(|s| s.parse().ok()),
        }))
}
