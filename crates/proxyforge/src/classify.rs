//! Classifier module for labelling sources as mobile or standard footage.
//!
//! Mobile/consumer recordings are often variable frame rate and stutter when
//! transcoded to editing codecs, so downstream planning forces them to H.264.
//! The classifier only labels; it makes no transcoding decision itself.
//!
//! Precedence:
//! 1. A marker file in any ancestor directory -> Mobile
//! 2. Metadata: Android tags, known phone make/model, or VFR -> Mobile
//! 3. Otherwise -> Standard
//!
//! A failing probe falls back to Standard and yields a warning.

use crate::probe::{DeviceMetadata, MetadataProbe};
use crate::scan::ScanCandidate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Device class of a source recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Standard,
    Mobile,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Standard => write!(f, "standard"),
            DeviceClass::Mobile => write!(f, "mobile"),
        }
    }
}

/// How a classification was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detection {
    /// Marker file found at the given path
    Marker { path: PathBuf },
    /// `AndroidVersion` metadata tag present
    AndroidMetadata,
    /// Make/model matches a known consumer device
    DeviceSignature { make: String, model: String },
    /// Frame rate is variable
    VariableFrameRate,
    /// Nothing indicated a mobile recording
    None,
    /// Probe failed; classified standard by default
    ProbeFailed,
}

/// Non-fatal problem encountered while classifying a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ClassificationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "metadata probe failed for {} ({}); treating as standard footage",
            self.path.display(),
            self.message
        )
    }
}

/// A classified source video. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(skip)]
    pub modified_time: SystemTime,
    pub device_class: DeviceClass,
    pub detection: Detection,
}

impl SourceFile {
    pub fn is_mobile(&self) -> bool {
        self.device_class == DeviceClass::Mobile
    }
}

/// Result of classifying a single candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: DeviceClass,
    pub detection: Detection,
    pub warning: Option<ClassificationWarning>,
}

/// Make names of consumer phone vendors (lowercase).
const CONSUMER_MAKES: &[&str] = &[
    "apple", "samsung", "google", "xiaomi", "oneplus", "huawei", "motorola", "oppo", "vivo",
    "sony mobile", "lg electronics", "nothing", "realme", "honor",
];

/// Model fragments identifying phones regardless of make (lowercase).
const CONSUMER_MODEL_HINTS: &[&str] = &["iphone", "ipad", "pixel", "galaxy", "sm-", "redmi"];

/// Returns true if make/model tags identify a consumer phone or tablet.
pub fn is_consumer_signature(make: Option<&str>, model: Option<&str>) -> bool {
    let make = make.map(str::to_lowercase).unwrap_or_default();
    let model = model.map(str::to_lowercase).unwrap_or_default();

    // Apple also tags desktop screen recordings; require a device model
    if make == "apple" {
        return model.contains("iphone") || model.contains("ipad");
    }

    CONSUMER_MAKES.contains(&make.as_str())
        || CONSUMER_MODEL_HINTS.iter().any(|hint| model.contains(hint))
}

/// Classifies probed metadata.
pub fn classify_metadata(meta: &DeviceMetadata) -> (DeviceClass, Detection) {
    if meta.android_version.is_some() {
        return (DeviceClass::Mobile, Detection::AndroidMetadata);
    }
    if is_consumer_signature(meta.make.as_deref(), meta.model.as_deref()) {
        return (
            DeviceClass::Mobile,
            Detection::DeviceSignature {
                make: meta.make.clone().unwrap_or_default(),
                model: meta.model.clone().unwrap_or_default(),
            },
        );
    }
    if meta.variable_frame_rate {
        return (DeviceClass::Mobile, Detection::VariableFrameRate);
    }
    (DeviceClass::Standard, Detection::None)
}

/// Memoised lookup of the mobile marker file along directory chains.
#[derive(Debug)]
pub struct MarkerLookup {
    marker_name: String,
    cache: HashMap<PathBuf, Option<PathBuf>>,
}

impl MarkerLookup {
    pub fn new(marker_name: &str) -> Self {
        Self {
            marker_name: marker_name.to_string(),
            cache: HashMap::new(),
        }
    }

    /// Returns the nearest marker in the file's directory or any ancestor.
    pub fn find_for(&mut self, file: &Path) -> Option<PathBuf> {
        let dir = file.parent()?;
        self.find_in_chain(dir)
    }

    fn find_in_chain(&mut self, dir: &Path) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get(dir) {
            return cached.clone();
        }

        let marker = dir.join(&self.marker_name);
        let found = if marker.is_file() {
            Some(marker)
        } else {
            match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => self.find_in_chain(parent),
                _ => None,
            }
        };

        self.cache.insert(dir.to_path_buf(), found.clone());
        found
    }
}

/// Classifies one candidate.
pub fn classify_source(
    path: &Path,
    markers: &mut MarkerLookup,
    probe: &dyn MetadataProbe,
) -> Classification {
    if let Some(marker) = markers.find_for(path) {
        return Classification {
            class: DeviceClass::Mobile,
            detection: Detection::Marker { path: marker },
            warning: None,
        };
    }

    match probe.probe(path) {
        Ok(meta) => {
            let (class, detection) = classify_metadata(&meta);
            Classification {
                class,
                detection,
                warning: None,
            }
        }
        Err(e) => Classification {
            class: DeviceClass::Standard,
            detection: Detection::ProbeFailed,
            warning: Some(ClassificationWarning {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        },
    }
}

/// Classifies every candidate, returning the sources and collected warnings.
pub fn classify_all(
    candidates: Vec<ScanCandidate>,
    marker_name: &str,
    probe: &dyn MetadataProbe,
) -> (Vec<SourceFile>, Vec<ClassificationWarning>) {
    let mut markers = MarkerLookup::new(marker_name);
    let mut warnings = Vec::new();

    let sources = candidates
        .into_iter()
        .map(|candidate| {
            let classification = classify_source(&candidate.path, &mut markers, probe);
            if let Some(warning) = classification.warning {
                warn!("{}", warning);
                warnings.push(warning);
            }
            debug!(
                "Classified {} as {} ({:?})",
                candidate.path.display(),
                classification.class,
                classification.detection
            );
            SourceFile {
                path: candidate.path,
                size_bytes: candidate.size_bytes,
                modified_time: candidate.modified_time,
                device_class: classification.class,
                detection: classification.detection,
            }
        })
        .collect();

    (sources, warnings)
}
