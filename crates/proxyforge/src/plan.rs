//! Conflict resolution and execution planning.
//!
//! Before any encode starts, every source gets exactly one [`JobPlanEntry`]
//! with a final [`Resolution`]. The pass is single-threaded and is the only
//! place that looks at existing proxies; once it returns, the scheduler never
//! asks anything or re-checks the destination directory.
//!
//! A conflict is an existing proxy for the same source in a different format.
//! How conflicts resolve is driven by a [`ConflictPolicy`] that is threaded
//! through the pass: while `Undecided` the [`ConflictPrompt`] is asked per
//! file, and the first "apply to all" answer fixes the policy for every
//! remaining conflict.
//!
//! Every runnable entry gets a destination no other entry of the same plan
//! uses. Existing proxies only count when the validator finds a video stream
//! in them; anything else is treated as a leftover and overwritten.

use crate::classify::SourceFile;
use crate::layout::OutputLayout;
use crate::probe::MetadataProbe;
use log::{debug, info, warn};
use proxyforge_config::{Codec, ConflictMode, Scale};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for the planning pass. Any error aborts the whole run.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// The proxies directory exists but cannot be listed.
    #[error("Cannot read proxies directory {path}: {source}")]
    ProxiesDirUnreadable { path: PathBuf, source: io::Error },

    /// A proxy colliding with a planned output cannot be read.
    #[error("Existing proxy {path} is not readable: {source}")]
    UnreadableProxy { path: PathBuf, source: io::Error },
}

/// Final decision for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Encode to the regular proxy destination
    Proceed,
    /// Do not encode
    Skip,
    /// Encode next to an existing proxy of another format
    Duplicate,
}

/// Why an entry resolved to [`Resolution::Skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A proxy with the planned name already exists
    ProxyExists,
    /// The operator (or skip-all policy) declined a duplicate
    ConflictSkipped,
    /// The duplicate name is already the destination of another entry
    DestinationClaimed,
}

/// Why the planned codec differs from (or matches) the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecDecision {
    Requested,
    /// Mobile footage is always encoded to H.264
    MobileOverride,
}

/// Planned work for one source. Never mutated after planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPlanEntry {
    pub source: SourceFile,
    pub requested_codec: Codec,
    pub codec: Codec,
    pub codec_decision: CodecDecision,
    pub scale: Scale,
    pub destination: PathBuf,
    pub resolution: Resolution,
    pub skip_reason: Option<SkipReason>,
    /// The pre-existing proxy behind a skip or duplicate decision
    pub existing_proxy: Option<PathBuf>,
    /// A file without a video stream at the destination; the encode replaces it
    pub invalid_proxy: Option<PathBuf>,
}

impl JobPlanEntry {
    /// Whether the scheduler should run this entry
    pub fn is_runnable(&self) -> bool {
        matches!(self.resolution, Resolution::Proceed | Resolution::Duplicate)
    }
}

/// Stickiness state of conflict handling during one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Ask per conflicting file
    Undecided,
    /// Every remaining conflict becomes a duplicate
    DuplicateAll,
    /// Every remaining conflict is skipped
    SkipAll,
}

impl From<ConflictMode> for ConflictPolicy {
    fn from(mode: ConflictMode) -> Self {
        match mode {
            ConflictMode::Ask => ConflictPolicy::Undecided,
            ConflictMode::Duplicate => ConflictPolicy::DuplicateAll,
            ConflictMode::Skip => ConflictPolicy::SkipAll,
        }
    }
}

/// Answer to a single conflict prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Duplicate,
    Skip,
    DuplicateAll,
    SkipAll,
}

impl ConflictChoice {
    /// Parses operator input: `y/yes`, `s/skip`, `ya/yes-all`, `sa/skip-all`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Some(ConflictChoice::Duplicate),
            "s" | "skip" => Some(ConflictChoice::Skip),
            "ya" | "yes-all" => Some(ConflictChoice::DuplicateAll),
            "sa" | "skip-all" => Some(ConflictChoice::SkipAll),
            _ => None,
        }
    }
}

impl ConflictPolicy {
    /// Resolves one conflict, asking `prompt` only while undecided.
    ///
    /// Returns whether to duplicate and the policy for the next conflict.
    pub fn resolve(
        self,
        conflict: &Conflict<'_>,
        prompt: &mut dyn ConflictPrompt,
    ) -> (bool, ConflictPolicy) {
        match self {
            ConflictPolicy::DuplicateAll => (true, self),
            ConflictPolicy::SkipAll => (false, self),
            ConflictPolicy::Undecided => match prompt.choose(conflict) {
                ConflictChoice::Duplicate => (true, ConflictPolicy::Undecided),
                ConflictChoice::Skip => (false, ConflictPolicy::Undecided),
                ConflictChoice::DuplicateAll => (true, ConflictPolicy::DuplicateAll),
                ConflictChoice::SkipAll => (false, ConflictPolicy::SkipAll),
            },
        }
    }
}

/// A planned proxy colliding with an existing proxy of another format.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    pub source: &'a Path,
    pub existing: &'a Path,
    pub planned: &'a Path,
}

/// Decision maker consulted for conflicts while the policy is undecided.
pub trait ConflictPrompt {
    fn choose(&mut self, conflict: &Conflict<'_>) -> ConflictChoice;
}

/// Prompt for contexts where nobody can answer; always gives the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub ConflictChoice);

impl ConflictPrompt for FixedChoice {
    fn choose(&mut self, _conflict: &Conflict<'_>) -> ConflictChoice {
        self.0
    }
}

/// What to encode and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    pub codec: Codec,
    pub scale: Scale,
}

/// Codec actually used for a source.
pub fn effective_codec(requested: Codec, source: &SourceFile) -> (Codec, CodecDecision) {
    if source.is_mobile() {
        (Codec::H264, CodecDecision::MobileOverride)
    } else {
        (requested, CodecDecision::Requested)
    }
}

/// The fully resolved plan of one run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub entries: Vec<JobPlanEntry>,
    /// Policy in force when the pass ended
    pub final_policy: ConflictPolicy,
    /// Number of times the prompt was consulted
    pub prompts: usize,
}

impl ExecutionPlan {
    pub fn runnable(&self) -> impl Iterator<Item = &JobPlanEntry> {
        self.entries.iter().filter(|e| e.is_runnable())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &JobPlanEntry> {
        self.entries.iter().filter(|e| !e.is_runnable())
    }

    pub fn count(&self, resolution: Resolution) -> usize {
        self.entries
            .iter()
            .filter(|e| e.resolution == resolution)
            .count()
    }

    /// Entries the scheduler runs, in plan order
    pub fn into_runnable(self) -> Vec<JobPlanEntry> {
        self.entries.into_iter().filter(|e| e.is_runnable()).collect()
    }
}

/// Files of the proxies directory, indexed by lowercase stem.
struct ProxyIndex {
    by_stem: HashMap<String, Vec<PathBuf>>,
}

impl ProxyIndex {
    fn load(dir: &Path) -> Result<Self, PlanningError> {
        let mut by_stem: HashMap<String, Vec<PathBuf>> = HashMap::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self { by_stem }),
            Err(source) => {
                return Err(PlanningError::ProxiesDirUnreadable {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| PlanningError::ProxiesDirUnreadable {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                by_stem
                    .entry(stem.to_string_lossy().to_lowercase())
                    .or_default()
                    .push(path);
            }
        }

        for paths in by_stem.values_mut() {
            paths.sort();
        }

        Ok(Self { by_stem })
    }

    fn with_stem(&self, stem: &str) -> &[PathBuf] {
        self.by_stem
            .get(&stem.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Existing file matching `planned`'s name, ignoring case
    fn existing(&self, planned: &Path) -> Option<&PathBuf> {
        let stem = planned.file_stem()?.to_string_lossy();
        self.with_stem(&stem).iter().find(|p| same_name(p, planned))
    }
}

fn same_name(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => {
            a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
        }
        _ => false,
    }
}

fn stem_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lowercase destination stems handed out so far in one planning pass.
#[derive(Debug, Default)]
struct ClaimedStems(HashSet<String>);

impl ClaimedStems {
    /// Claims `path`'s stem; false when another entry already holds it
    fn claim(&mut self, path: &Path) -> bool {
        self.0.insert(stem_key(path))
    }

    /// Claims the first candidate whose stem is still free
    fn claim_first(&mut self, candidates: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            if self.claim(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Whether an existing proxy has a video stream. Probe errors count as invalid.
fn is_valid_proxy(validator: &dyn MetadataProbe, path: &Path) -> bool {
    match validator.has_video_stream(path) {
        Ok(true) => true,
        Ok(false) => {
            warn!("Existing proxy {} has no video stream", path.display());
            false
        }
        Err(e) => {
            warn!("Cannot validate existing proxy {}: {}", path.display(), e);
            false
        }
    }
}

fn ensure_readable(path: &Path) -> Result<(), PlanningError> {
    File::open(path)
        .map(|_| ())
        .map_err(|source| PlanningError::UnreadableProxy {
            path: path.to_path_buf(),
            source,
        })
}

/// Builds the execution plan for `sources`.
///
/// Each source first claims a destination stem from
/// [`OutputLayout::destination_candidates`] that no earlier source of the
/// pass holds. Then:
/// - a valid proxy with the planned name exists -> `Skip` (proxy exists)
/// - an invalid file with the planned name exists -> `Proceed`, overwriting it
/// - a valid proxy with the same stem but another extension exists ->
///   conflict, resolved through `policy` / `prompt` into `Duplicate` or `Skip`
/// - otherwise -> `Proceed`
///
/// Duplicates are written to [`OutputLayout::duplicate_path`] of the planned
/// destination; if a valid proxy with that name exists the entry is skipped.
pub fn resolve_plan(
    sources: &[SourceFile],
    request: PlanRequest,
    layout: &OutputLayout,
    validator: &dyn MetadataProbe,
    policy: ConflictPolicy,
    prompt: &mut dyn ConflictPrompt,
) -> Result<ExecutionPlan, PlanningError> {
    let index = ProxyIndex::load(layout.proxies_dir())?;
    let mut claimed = ClaimedStems::default();
    let mut policy = policy;
    let mut prompts = 0;
    let mut entries = Vec::with_capacity(sources.len());

    for source in sources {
        let (codec, codec_decision) = effective_codec(request.codec, source);
        let planned = claimed
            .claim_first(layout.destination_candidates(&source.path, codec))
            .unwrap_or_else(|| layout.proxy_path(&source.path, codec));
        let mut entry = JobPlanEntry {
            source: source.clone(),
            requested_codec: request.codec,
            codec,
            codec_decision,
            scale: request.scale,
            destination: planned.clone(),
            resolution: Resolution::Proceed,
            skip_reason: None,
            existing_proxy: None,
            invalid_proxy: None,
        };

        if let Some(existing) = index.existing(&planned) {
            ensure_readable(existing)?;
            if is_valid_proxy(validator, existing) {
                debug!("Proxy already exists for {}", source.path.display());
                entry.resolution = Resolution::Skip;
                entry.skip_reason = Some(SkipReason::ProxyExists);
                entry.existing_proxy = Some(existing.clone());
            } else {
                info!("Replacing invalid proxy {}", existing.display());
                entry.invalid_proxy = Some(existing.clone());
            }
            entries.push(entry);
            continue;
        }

        let mut other_format = None;
        for candidate in index.with_stem(&stem_key(&planned)) {
            if same_name(candidate, &planned) {
                continue;
            }
            ensure_readable(candidate)?;
            if is_valid_proxy(validator, candidate) {
                other_format = Some(candidate);
                break;
            }
        }

        if let Some(existing) = other_format {
            let conflict = Conflict {
                source: &source.path,
                existing,
                planned: &planned,
            };
            if policy == ConflictPolicy::Undecided {
                prompts += 1;
            }
            let (duplicate, next) = policy.resolve(&conflict, prompt);
            policy = next;
            entry.existing_proxy = Some(existing.clone());

            if !duplicate {
                entry.resolution = Resolution::Skip;
                entry.skip_reason = Some(SkipReason::ConflictSkipped);
            } else {
                let duplicate_path = layout.duplicate_path(&planned, codec);
                if !claimed.claim(&duplicate_path) {
                    warn!(
                        "Duplicate {} is already planned for another file; skipping {}",
                        duplicate_path.display(),
                        source.path.display()
                    );
                    entry.resolution = Resolution::Skip;
                    entry.skip_reason = Some(SkipReason::DestinationClaimed);
                } else {
                    match index.existing(&duplicate_path) {
                        Some(already) => {
                            ensure_readable(already)?;
                            if is_valid_proxy(validator, already) {
                                entry.resolution = Resolution::Skip;
                                entry.skip_reason = Some(SkipReason::ProxyExists);
                                entry.existing_proxy = Some(already.clone());
                            } else {
                                entry.resolution = Resolution::Duplicate;
                                entry.destination = duplicate_path;
                                entry.invalid_proxy = Some(already.clone());
                            }
                        }
                        None => {
                            entry.resolution = Resolution::Duplicate;
                            entry.destination = duplicate_path;
                        }
                    }
                }
            }
        }

        entries.push(entry);
    }

    let plan = ExecutionPlan {
        entries,
        final_policy: policy,
        prompts,
    };
    info!(
        "Plan ready: {} proceed, {} duplicate, {} skip",
        plan.count(Resolution::Proceed),
        plan.count(Resolution::Duplicate),
        plan.count(Resolution::Skip)
    );
    Ok(plan)
}

/// Builds a plan without looking at the destination directory.
///
/// Only valid when the proxies directory is known to be empty, e.g. right
/// after the benchmark purged it. Destinations are still unique per plan.
pub fn plan_clean_start(
    sources: &[SourceFile],
    request: PlanRequest,
    layout: &OutputLayout,
) -> ExecutionPlan {
    let mut claimed = ClaimedStems::default();
    let entries = sources
        .iter()
        .map(|source| {
            let (codec, codec_decision) = effective_codec(request.codec, source);
            let destination = claimed
                .claim_first(layout.destination_candidates(&source.path, codec))
                .unwrap_or_else(|| layout.proxy_path(&source.path, codec));
            JobPlanEntry {
                source: source.clone(),
                requested_codec: request.codec,
                codec,
                codec_decision,
                scale: request.scale,
                destination,
                resolution: Resolution::Proceed,
                skip_reason: None,
                existing_proxy: None,
                invalid_proxy: None,
            }
        })
        .collect();

    ExecutionPlan {
        entries,
        final_policy: ConflictPolicy::Undecided,
        prompts: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DeviceClass, Detection};
    use crate::testutil::NonEmptyProbe;
    use proptest::prelude::*;
    use proxyforge_config::ScanConfig;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Prompt replaying scripted answers and recording every question.
    struct ScriptedPrompt {
        answers: Vec<ConflictChoice>,
        asked: Vec<PathBuf>,
    }

    impl ScriptedPrompt {
        fn new(answers: Vec<ConflictChoice>) -> Self {
            Self {
                answers,
                asked: Vec::new(),
            }
        }
    }

    impl ConflictPrompt for ScriptedPrompt {
        fn choose(&mut self, conflict: &Conflict<'_>) -> ConflictChoice {
            let answer = self.answers[self.asked.len() % self.answers.len()];
            self.asked.push(conflict.source.to_path_buf());
            answer
        }
    }

    /// Prompt that must never be consulted.
    struct NoPrompt;

    impl ConflictPrompt for NoPrompt {
        fn choose(&mut self, conflict: &Conflict<'_>) -> ConflictChoice {
            panic!("unexpected prompt for {}", conflict.source.display());
        }
    }

    struct Fixture {
        _temp: TempDir,
        layout: OutputLayout,
        tree: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let tree = temp.path().join("shoot");
            fs::create_dir_all(&tree).unwrap();
            let layout = OutputLayout::for_tree(&tree, &ScanConfig::default());
            fs::create_dir_all(layout.proxies_dir()).unwrap();
            Self {
                _temp: temp,
                layout,
                tree,
            }
        }

        fn source(&self, name: &str, class: DeviceClass) -> SourceFile {
            let path = self.tree.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"src").unwrap();
            SourceFile {
                path,
                size_bytes: 3,
                modified_time: SystemTime::UNIX_EPOCH,
                device_class: class,
                detection: Detection::None,
            }
        }

        fn existing_proxy(&self, name: &str) -> PathBuf {
            let path = self.layout.proxies_dir().join(name);
            fs::write(&path, b"proxy").unwrap();
            path
        }

        /// An empty leftover, e.g. from an interrupted encode
        fn broken_proxy(&self, name: &str) -> PathBuf {
            let path = self.layout.proxies_dir().join(name);
            fs::write(&path, b"").unwrap();
            path
        }
    }

    fn request(codec: Codec) -> PlanRequest {
        PlanRequest {
            codec,
            scale: Scale::Quarter,
        }
    }

    #[test]
    fn test_no_conflicts_all_proceed() {
        let fx = Fixture::new();
        let sources = vec![
            fx.source("a.mov", DeviceClass::Standard),
            fx.source("b.mov", DeviceClass::Standard),
        ];

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert!(plan.entries.iter().all(|e| e.resolution == Resolution::Proceed));
        assert_eq!(
            plan.entries[0].destination,
            fx.layout.proxies_dir().join("a_proxy.mov")
        );
        assert_eq!(plan.prompts, 0);
    }

    #[test]
    fn test_existing_prores_proxy_with_h264_request_duplicates() {
        let fx = Fixture::new();
        let existing = fx.existing_proxy("clip001_proxy.mov");
        let sources = vec![fx.source("clip001.mxf", DeviceClass::Standard)];

        let mut prompt = ScriptedPrompt::new(vec![ConflictChoice::Duplicate]);
        let plan = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut prompt,
        )
        .unwrap();

        let entry = &plan.entries[0];
        assert_eq!(entry.resolution, Resolution::Duplicate);
        assert_ne!(entry.destination, existing);
        assert_eq!(
            entry.destination,
            fx.layout.proxies_dir().join("clip001_proxy_h264.mp4")
        );
        assert_eq!(entry.existing_proxy.as_ref(), Some(&existing));
        assert_eq!(prompt.asked.len(), 1);
    }

    #[test]
    fn test_conflict_skip_keeps_existing_untouched() {
        let fx = Fixture::new();
        fx.existing_proxy("clip001_proxy.mov");
        let sources = vec![fx.source("clip001.mxf", DeviceClass::Standard)];

        let plan = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut ScriptedPrompt::new(vec![ConflictChoice::Skip]),
        )
        .unwrap();

        assert_eq!(plan.entries[0].resolution, Resolution::Skip);
        assert_eq!(
            plan.entries[0].skip_reason,
            Some(SkipReason::ConflictSkipped)
        );
        assert_eq!(plan.runnable().count(), 0);
    }

    #[test]
    fn test_same_format_proxy_is_skipped_without_prompt() {
        let fx = Fixture::new();
        fx.existing_proxy("A_PROXY.MOV");
        let sources = vec![fx.source("a.mov", DeviceClass::Standard)];

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        assert_eq!(plan.entries[0].resolution, Resolution::Skip);
        assert_eq!(plan.entries[0].skip_reason, Some(SkipReason::ProxyExists));
    }

    #[test]
    fn test_existing_duplicate_is_skipped() {
        let fx = Fixture::new();
        fx.existing_proxy("a_proxy.mov");
        fx.existing_proxy("a_proxy_h264.mp4");
        let sources = vec![fx.source("a.mov", DeviceClass::Standard)];

        let plan = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::DuplicateAll,
            &mut NoPrompt,
        )
        .unwrap();

        assert_eq!(plan.entries[0].resolution, Resolution::Skip);
        assert_eq!(plan.entries[0].skip_reason, Some(SkipReason::ProxyExists));
    }

    #[test]
    fn test_mobile_sources_forced_to_h264() {
        let fx = Fixture::new();
        let sources = vec![
            fx.source("phone1.mp4", DeviceClass::Mobile),
            fx.source("phone2.mp4", DeviceClass::Mobile),
        ];

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        for entry in &plan.entries {
            assert_eq!(entry.codec, Codec::H264);
            assert_eq!(entry.requested_codec, Codec::Prores);
            assert_eq!(entry.codec_decision, CodecDecision::MobileOverride);
            assert_eq!(entry.destination.extension().unwrap(), "mp4");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_existing_proxy_is_planning_error() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let existing = fx.existing_proxy("a_proxy.mov");
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&existing).is_ok() {
            // Running as root; permissions are not enforced
            return;
        }
        let sources = vec![fx.source("a.mov", DeviceClass::Standard)];

        let result = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::DuplicateAll,
            &mut NoPrompt,
        );
        assert!(matches!(
            result,
            Err(PlanningError::UnreadableProxy { .. })
        ));
    }

    #[test]
    fn test_missing_proxies_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("shoot");
        fs::create_dir_all(&tree).unwrap();
        let layout = OutputLayout::for_tree(&tree, &ScanConfig::default());
        let src = tree.join("a.mov");
        fs::write(&src, b"x").unwrap();
        let sources = vec![SourceFile {
            path: src,
            size_bytes: 1,
            modified_time: SystemTime::UNIX_EPOCH,
            device_class: DeviceClass::Standard,
            detection: Detection::None,
        }];

        let plan = resolve_plan(
            &sources,
            request(Codec::Dnxhr),
            &layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();
        assert_eq!(plan.entries[0].resolution, Resolution::Proceed);
    }

    fn destination_names(plan: &ExecutionPlan) -> Vec<String> {
        plan.entries
            .iter()
            .map(|e| e.destination.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_same_stem_sources_get_distinct_destinations() {
        let fx = Fixture::new();
        let sources = vec![
            fx.source("cam_a/clip001.mov", DeviceClass::Standard),
            fx.source("cam_b/clip001.mov", DeviceClass::Standard),
            fx.source("clip002.mov", DeviceClass::Standard),
            fx.source("clip002.mxf", DeviceClass::Standard),
        ];

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        assert!(plan.entries.iter().all(|e| e.resolution == Resolution::Proceed));
        assert_eq!(
            destination_names(&plan),
            vec![
                "clip001_proxy.mov",
                "clip001_proxy_mov.mov",
                "clip002_proxy.mov",
                "clip002_proxy_mxf.mov",
            ]
        );
    }

    #[test]
    fn test_rerun_after_same_stem_run_skips_everything() {
        let fx = Fixture::new();
        let sources = vec![
            fx.source("cam_a/clip001.mov", DeviceClass::Standard),
            fx.source("cam_b/clip001.mov", DeviceClass::Standard),
        ];
        fx.existing_proxy("clip001_proxy.mov");
        fx.existing_proxy("clip001_proxy_mov.mov");

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        for entry in &plan.entries {
            assert_eq!(entry.skip_reason, Some(SkipReason::ProxyExists));
        }
    }

    #[test]
    fn test_duplicate_name_claimed_by_earlier_entry_is_skipped() {
        let fx = Fixture::new();
        fx.existing_proxy("clip_proxy_mov.mov");
        let sources = vec![
            fx.source("a/clip.mov", DeviceClass::Standard),
            // No extension, so the folder name qualifies it: clip_proxy_mov_h264
            fx.source("mov_h264/clip", DeviceClass::Standard),
            fx.source("b/clip.mov", DeviceClass::Standard),
        ];

        let plan = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::DuplicateAll,
            &mut NoPrompt,
        )
        .unwrap();

        assert_eq!(
            destination_names(&plan)[..2],
            ["clip_proxy.mp4", "clip_proxy_mov_h264.mp4"]
        );
        let third = &plan.entries[2];
        assert_eq!(third.resolution, Resolution::Skip);
        assert_eq!(third.skip_reason, Some(SkipReason::DestinationClaimed));
        assert_eq!(plan.runnable().count(), 2);
    }

    #[test]
    fn test_invalid_existing_proxy_is_overwritten() {
        let fx = Fixture::new();
        let broken = fx.broken_proxy("a_proxy.mov");
        let sources = vec![fx.source("a.mov", DeviceClass::Standard)];

        let plan = resolve_plan(
            &sources,
            request(Codec::Prores),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        let entry = &plan.entries[0];
        assert_eq!(entry.resolution, Resolution::Proceed);
        assert_eq!(entry.destination, broken);
        assert_eq!(entry.invalid_proxy.as_ref(), Some(&broken));
    }

    #[test]
    fn test_invalid_other_format_is_not_a_conflict() {
        let fx = Fixture::new();
        fx.broken_proxy("clip_proxy.mov");
        let sources = vec![fx.source("clip.mxf", DeviceClass::Standard)];

        let plan = resolve_plan(
            &sources,
            request(Codec::H264),
            &fx.layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        )
        .unwrap();

        assert_eq!(plan.entries[0].resolution, Resolution::Proceed);
        assert_eq!(destination_names(&plan), vec!["clip_proxy.mp4"]);
        assert_eq!(plan.prompts, 0);
    }

    #[test]
    fn test_proxies_path_that_is_a_file_is_planning_error() {
        let temp = TempDir::new().unwrap();
        let tree = temp.path().join("shoot");
        fs::create_dir_all(&tree).unwrap();
        let layout = OutputLayout::for_tree(&tree, &ScanConfig::default());
        fs::write(layout.proxies_dir(), b"not a directory").unwrap();
        let src = tree.join("a.mov");
        fs::write(&src, b"x").unwrap();
        let sources = vec![SourceFile {
            path: src,
            size_bytes: 1,
            modified_time: SystemTime::UNIX_EPOCH,
            device_class: DeviceClass::Standard,
            detection: Detection::None,
        }];

        let result = resolve_plan(
            &sources,
            request(Codec::Prores),
            &layout,
            &NonEmptyProbe,
            ConflictPolicy::Undecided,
            &mut NoPrompt,
        );
        assert!(matches!(
            result,
            Err(PlanningError::ProxiesDirUnreadable { ref path, .. }) if path == layout.proxies_dir()
        ));
    }

    #[test]
    fn test_clean_start_destinations_are_distinct() {
        let fx = Fixture::new();
        let sources = vec![
            fx.source("day1/clip.mov", DeviceClass::Standard),
            fx.source("day2/clip.mov", DeviceClass::Standard),
            fx.source("day3/clip.mov", DeviceClass::Standard),
        ];

        let plan = plan_clean_start(&sources, request(Codec::Prores), &fx.layout);
        assert_eq!(
            destination_names(&plan),
            vec!["clip_proxy.mov", "clip_proxy_mov.mov", "clip_proxy_day3.mov"]
        );
    }

    #[test]
    fn test_choice_parsing() {
        assert_eq!(ConflictChoice::parse("Y"), Some(ConflictChoice::Duplicate));
        assert_eq!(ConflictChoice::parse(" skip "), Some(ConflictChoice::Skip));
        assert_eq!(ConflictChoice::parse("ya"), Some(ConflictChoice::DuplicateAll));
        assert_eq!(ConflictChoice::parse("skip-all"), Some(ConflictChoice::SkipAll));
        assert_eq!(ConflictChoice::parse("maybe"), None);
    }

    fn choice_strategy() -> impl Strategy<Value = ConflictChoice> {
        prop_oneof![
            Just(ConflictChoice::Duplicate),
            Just(ConflictChoice::Skip),
            Just(ConflictChoice::DuplicateAll),
            Just(ConflictChoice::SkipAll),
        ]
    }

    // *For any* set of conflicting sources and any sequence of operator
    // answers, the plan covers every source, the prompt is never consulted
    // after the first "apply to all" answer, and every later conflict resolves
    // the way that answer dictates.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_apply_to_all_is_sticky(
            n in 1usize..12,
            answers in proptest::collection::vec(choice_strategy(), 1..12),
        ) {
            let fx = Fixture::new();
            let sources: Vec<_> = (0..n)
                .map(|i| {
                    fx.existing_proxy(&format!("clip{:03}_proxy.mov", i));
                    fx.source(&format!("clip{:03}.mxf", i), DeviceClass::Standard)
                })
                .collect();

            let mut prompt = ScriptedPrompt::new(answers.clone());
            let plan = resolve_plan(
                &sources,
                request(Codec::H264),
                &fx.layout,
                &NonEmptyProbe,
                ConflictPolicy::Undecided,
                &mut prompt,
            ).unwrap();

            prop_assert_eq!(plan.entries.len(), n);
            prop_assert_eq!(plan.prompts, prompt.asked.len());

            let sticky_at = answers
                .iter()
                .position(|a| matches!(a, ConflictChoice::DuplicateAll | ConflictChoice::SkipAll))
                .filter(|&i| i < n);

            match sticky_at {
                Some(i) => {
                    prop_assert_eq!(prompt.asked.len(), i + 1);
                    let expected = if answers[i] == ConflictChoice::DuplicateAll {
                        Resolution::Duplicate
                    } else {
                        Resolution::Skip
                    };
                    for entry in &plan.entries[i..] {
                        prop_assert_eq!(entry.resolution, expected);
                    }
                }
                None => prop_assert_eq!(prompt.asked.len(), n),
            }
        }

        // *For any* starting "apply to all" policy, no prompt is ever issued.
        #[test]
        fn prop_preset_policy_never_prompts(
            n in 1usize..8,
            duplicate in proptest::bool::ANY,
        ) {
            let fx = Fixture::new();
            let sources: Vec<_> = (0..n)
                .map(|i| {
                    fx.existing_proxy(&format!("c{}_proxy.mp4", i));
                    fx.source(&format!("c{}.mov", i), DeviceClass::Standard)
                })
                .collect();
            let policy = if duplicate { ConflictPolicy::DuplicateAll } else { ConflictPolicy::SkipAll };

            let plan = resolve_plan(&sources, request(Codec::Prores), &fx.layout, &NonEmptyProbe, policy, &mut NoPrompt).unwrap();

            prop_assert_eq!(plan.prompts, 0);
            prop_assert_eq!(plan.final_policy, policy);
            let expected = if duplicate { Resolution::Duplicate } else { Resolution::Skip };
            prop_assert!(plan.entries.iter().all(|e| e.resolution == expected));
        }

        // *For any* mix of sources sharing stems across folders and
        // extensions, any pre-existing proxies, and any preset policy, no two
        // runnable entries share a destination stem and no runnable entry
        // targets a valid proxy already on disk.
        #[test]
        fn prop_runnable_destinations_are_distinct(
            picks in proptest::collection::btree_set((0usize..3, 0usize..3, 0usize..3), 1..12),
            existing in proptest::collection::btree_set((0usize..3, 0usize..3, 0usize..2), 0..6),
            mobile in proptest::bool::ANY,
            duplicate in proptest::bool::ANY,
        ) {
            const FOLDERS: [&str; 3] = ["cam_a", "cam_b", "day1/cam_a"];
            const EXTENSIONS: [&str; 3] = ["mov", "mxf", "mp4"];
            const QUALIFIERS: [&str; 3] = ["", "_mov", "_cam_a"];
            const PROXY_EXTENSIONS: [&str; 2] = ["mov", "mp4"];

            let fx = Fixture::new();
            let on_disk: Vec<PathBuf> = existing
                .iter()
                .map(|&(stem, q, ext)| {
                    fx.existing_proxy(&format!("clip{}_proxy{}.{}", stem, QUALIFIERS[q], PROXY_EXTENSIONS[ext]))
                })
                .collect();
            let sources: Vec<_> = picks
                .iter()
                .map(|&(folder, stem, ext)| {
                    let class = if mobile && ext == 2 { DeviceClass::Mobile } else { DeviceClass::Standard };
                    fx.source(&format!("{}/clip{}.{}", FOLDERS[folder], stem, EXTENSIONS[ext]), class)
                })
                .collect();
            let policy = if duplicate { ConflictPolicy::DuplicateAll } else { ConflictPolicy::SkipAll };

            let plan = resolve_plan(&sources, request(Codec::Prores), &fx.layout, &NonEmptyProbe, policy, &mut NoPrompt).unwrap();

            prop_assert_eq!(plan.entries.len(), sources.len());
            let mut seen = HashSet::new();
            for entry in plan.runnable() {
                prop_assert!(seen.insert(stem_key(&entry.destination)), "reused {}", entry.destination.display());
                prop_assert!(!on_disk.iter().any(|p| same_name(p, &entry.destination)));
            }
        }
    }
}
