//! Encoding: what a single proxy encode needs and how it is invoked.

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_command, codec_args, FfmpegInvoker};

use crate::cancel::CancelSignal;
use crate::probe::AudioInfo;
use proxyforge_config::{Codec, Scale};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder executable could not be launched. Fatal for a whole run.
    #[error("Encoder '{tool}' is not available")]
    ToolUnavailable { tool: String },

    /// The source vanished between planning and encoding
    #[error("Source file is missing: {0}")]
    MissingInput(PathBuf),

    /// Encoder exited with non-zero status
    #[error("Encoder failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// Encoder was terminated by signal
    #[error("Encoder was terminated by signal")]
    Terminated,

    /// Encode was stopped because the run was cancelled
    #[error("Encode cancelled")]
    Cancelled,

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Whether this error makes every remaining job pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, EncodeError::ToolUnavailable { .. })
    }
}

/// One proxy to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub codec: Codec,
    pub scale: Scale,
}

/// How the first audio stream is carried into the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioHandling {
    /// Stream copied as-is
    Copy,
    /// Re-encoded to AAC 128k
    Aac,
    /// No audio in the source
    Drop,
}

/// Compressed codecs that are cheap enough to copy into a proxy
const COPY_CODECS: &[&str] = &[
    "aac", "mp3", "ac3", "eac3", "dts", "truehd", "flac", "vorbis", "opus",
];

/// Above this bitrate an unknown codec is treated as uncompressed
const UNCOMPRESSED_BITRATE_BPS: u64 = 1_000_000;

/// Decides how audio is handled for a source.
///
/// - no audio stream -> drop
/// - known compressed codec -> copy
/// - PCM -> AAC
/// - anything else -> copy, unless its bitrate exceeds 1 Mbps
pub fn decide_audio(audio: Option<&AudioInfo>) -> AudioHandling {
    let Some(audio) = audio else {
        return AudioHandling::Drop;
    };

    let codec = audio.codec_name.as_str();
    if COPY_CODECS.contains(&codec) {
        AudioHandling::Copy
    } else if codec.starts_with("pcm_") {
        AudioHandling::Aac
    } else if audio.bit_rate.unwrap_or(0) > UNCOMPRESSED_BITRATE_BPS {
        AudioHandling::Aac
    } else {
        AudioHandling::Copy
    }
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeReport {
    pub audio: AudioHandling,
    pub output_bytes: u64,
}

/// Runs one encode. Implementations must be shareable across workers.
///
/// When `cancel` fires the implementation stops the encode, removes any
/// partial output, and returns [`EncodeError::Cancelled`].
pub trait EncodeInvoker: Send + Sync + 'static {
    fn encode(
        &self,
        request: &EncodeRequest,
        cancel: CancelSignal,
    ) -> impl Future<Output = Result<EncodeReport, EncodeError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(codec: &str, bit_rate: Option<u64>) -> AudioInfo {
        AudioInfo {
            codec_name: codec.to_string(),
            bit_rate,
            sample_rate: Some(48_000),
        }
    }

    #[test]
    fn test_decide_audio() {
        assert_eq!(decide_audio(None), AudioHandling::Drop);
        assert_eq!(decide_audio(Some(&audio("aac", Some(256_000)))), AudioHandling::Copy);
        assert_eq!(decide_audio(Some(&audio("opus", None))), AudioHandling::Copy);
        assert_eq!(
            decide_audio(Some(&audio("pcm_s24le", Some(2_304_000)))),
            AudioHandling::Aac
        );
        assert_eq!(decide_audio(Some(&audio("pcm_s16be", None))), AudioHandling::Aac);
        // Unknown codecs fall back to bitrate
        assert_eq!(
            decide_audio(Some(&audio("alac", Some(1_411_000)))),
            AudioHandling::Aac
        );
        assert_eq!(decide_audio(Some(&audio("alac", Some(320_000)))), AudioHandling::Copy);
        assert_eq!(decide_audio(Some(&audio("alac", None))), AudioHandling::Copy);
    }

    #[test]
    fn test_only_missing_tool_is_fatal() {
        assert!(EncodeError::ToolUnavailable {
            tool: "ffmpeg".into()
        }
        .is_fatal());
        assert!(!EncodeError::Failed {
            code: 1,
            stderr: String::new()
        }
        .is_fatal());
        assert!(!EncodeError::Cancelled.is_fatal());
        assert!(!EncodeError::MissingInput(PathBuf::from("/a.mov")).is_fatal());
    }
}
