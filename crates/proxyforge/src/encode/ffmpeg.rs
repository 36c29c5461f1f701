//! ffmpeg encoder
//!
//! Builds and runs the ffmpeg command for one proxy. Codec settings are fixed
//! per codec and tuned for fast, edit-friendly proxies rather than quality.

use super::{decide_audio, AudioHandling, EncodeError, EncodeInvoker, EncodeReport, EncodeRequest};
use crate::cancel::CancelSignal;
use crate::probe::probe_audio;
use log::{debug, warn};
use proxyforge_config::{Codec, ToolsConfig};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// x264 settings for H.264 proxies: fast preset, short GOP for scrubbing
const H264_ARGS: &[&str] = &[
    "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-profile:v", "high", "-level:v",
    "4.1", "-g", "30", "-bf", "2", "-refs", "3",
];

/// ProRes 422 Proxy
const PRORES_ARGS: &[&str] = &["-c:v", "prores_ks", "-profile:v", "0"];

/// DNxHR LB
const DNXHR_ARGS: &[&str] = &["-c:v", "dnxhd", "-profile:v", "dnxhr_lb"];

/// Bytes of encoder stderr kept for error reports
const STDERR_TAIL_BYTES: usize = 2048;

/// Video codec arguments for `codec`
pub fn codec_args(codec: Codec) -> &'static [&'static str] {
    match codec {
        Codec::H264 => H264_ARGS,
        Codec::Prores => PRORES_ARGS,
        Codec::Dnxhr => DNXHR_ARGS,
    }
}

fn audio_args(audio: AudioHandling) -> &'static [&'static str] {
    match audio {
        AudioHandling::Copy => &["-c:a", "copy"],
        AudioHandling::Aac => &["-c:a", "aac", "-b:a", "128k"],
        AudioHandling::Drop => &["-an"],
    }
}

/// Build the ffmpeg command for a request
///
/// Layout: `ffmpeg -hide_banner -y -i <src> -vf <scale> <codec args> <audio args> <dst>`
pub fn build_ffmpeg_command(
    ffmpeg: &str,
    request: &EncodeRequest,
    audio: AudioHandling,
) -> std::process::Command {
    let mut cmd = std::process::Command::new(ffmpeg);
    cmd.arg("-hide_banner").arg("-y");
    cmd.arg("-i").arg(&request.source);
    cmd.arg("-vf").arg(request.scale.filter());
    cmd.args(codec_args(request.codec));
    cmd.args(audio_args(audio));
    cmd.arg(&request.destination);
    cmd
}

/// Encode invoker running the external ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegInvoker {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }

    async fn audio_handling(&self, source: &Path) -> AudioHandling {
        let ffprobe = self.ffprobe.clone();
        let path = source.to_path_buf();
        let probed = tokio::task::spawn_blocking(move || probe_audio(&ffprobe, &path)).await;

        match probed {
            Ok(Ok(info)) => decide_audio(info.as_ref()),
            Ok(Err(e)) => {
                warn!(
                    "Could not probe audio of {}: {}; encoding without audio",
                    source.display(),
                    e
                );
                AudioHandling::Drop
            }
            Err(e) => {
                warn!("Audio probe task failed for {}: {}", source.display(), e);
                AudioHandling::Drop
            }
        }
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

impl EncodeInvoker for FfmpegInvoker {
    async fn encode(
        &self,
        request: &EncodeRequest,
        mut cancel: CancelSignal,
    ) -> Result<EncodeReport, EncodeError> {
        if !request.source.is_file() {
            return Err(EncodeError::MissingInput(request.source.clone()));
        }
        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        if let Some(parent) = request.destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let audio = self.audio_handling(&request.source).await;
        let mut cmd = Command::from(build_ffmpeg_command(&self.ffmpeg, request, audio));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", cmd.as_std());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EncodeError::ToolUnavailable {
                    tool: self.ffmpeg.clone(),
                })
            }
            Err(e) => return Err(EncodeError::Io(e)),
        };

        // Drain stderr concurrently so a chatty encoder never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop encoder for {}: {}", request.source.display(), e);
                }
                remove_partial(&request.destination);
                return Err(EncodeError::Cancelled);
            }
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            remove_partial(&request.destination);
            return Err(match status.code() {
                Some(code) => EncodeError::Failed {
                    code,
                    stderr: stderr_tail(&stderr),
                },
                None => EncodeError::Terminated,
            });
        }

        let output_bytes = std::fs::metadata(&request.destination)
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(EncodeReport {
            audio,
            output_bytes,
        })
    }
}
