//! Shared fixtures for unit tests.

use crate::cancel::CancelSignal;
use crate::classify::{Detection, DeviceClass, SourceFile};
use crate::encode::{AudioHandling, EncodeError, EncodeInvoker, EncodeReport, EncodeRequest};
use crate::plan::{CodecDecision, JobPlanEntry, Resolution};
use crate::probe::{DeviceMetadata, MetadataProbe, ProbeError};
use proxyforge_config::{Codec, Scale};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

pub(crate) fn source_file(path: &Path, class: DeviceClass) -> SourceFile {
    SourceFile {
        path: path.to_path_buf(),
        size_bytes: 1024,
        modified_time: SystemTime::UNIX_EPOCH,
        device_class: class,
        detection: Detection::None,
    }
}

/// A runnable entry for `/footage/shoot/<name>.mov`
pub(crate) fn plan_entry(name: &str) -> JobPlanEntry {
    JobPlanEntry {
        source: source_file(
            &PathBuf::from(format!("/footage/shoot/{}.mov", name)),
            DeviceClass::Standard,
        ),
        requested_codec: Codec::Prores,
        codec: Codec::Prores,
        codec_decision: CodecDecision::Requested,
        scale: Scale::Quarter,
        destination: PathBuf::from(format!("/footage/proxies/{}_proxy.mov", name)),
        resolution: Resolution::Proceed,
        skip_reason: None,
        existing_proxy: None,
        invalid_proxy: None,
    }
}

/// Metadata probe that reports empty files as having no video stream.
pub(crate) struct NonEmptyProbe;

impl MetadataProbe for NonEmptyProbe {
    fn probe(&self, _path: &Path) -> Result<DeviceMetadata, ProbeError> {
        Ok(DeviceMetadata::default())
    }

    fn has_video_stream(&self, path: &Path) -> Result<bool, ProbeError> {
        Ok(std::fs::metadata(path)?.len() > 0)
    }
}

/// Encoder double that sleeps instead of encoding and tracks concurrency.
#[derive(Debug, Default)]
pub(crate) struct FakeInvoker {
    pub delay: Duration,
    /// Source file names whose encode fails
    pub failing: HashSet<String>,
    pub tool_missing: bool,
    /// Write a small file at the destination on success
    pub write_output: bool,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeInvoker {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EncodeInvoker for FakeInvoker {
    async fn encode(
        &self,
        request: &EncodeRequest,
        mut cancel: CancelSignal,
    ) -> Result<EncodeReport, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.tool_missing {
            return Err(EncodeError::ToolUnavailable {
                tool: "ffmpeg".to_string(),
            });
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let finished = tokio::select! {
            _ = tokio::time::sleep(self.delay) => true,
            _ = cancel.cancelled() => false,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            return Err(EncodeError::Cancelled);
        }

        let name = request
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(EncodeError::Failed {
                code: 1,
                stderr: format!("cannot decode {}", name),
            });
        }

        if self.write_output {
            if let Some(parent) = request.destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&request.destination, b"proxy")?;
        }

        Ok(EncodeReport {
            audio: AudioHandling::Copy,
            output_bytes: 5,
        })
    }
}
