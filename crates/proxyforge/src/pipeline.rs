//! Top-level flows: proxy generation and benchmarking.
//!
//! Generation runs in two phases with a hard barrier between them:
//! 1. `prepare_run` (synchronous): scan, classify, move legacy proxies into
//!    place, and resolve every conflict into an immutable [`ExecutionPlan`].
//!    All operator interaction happens here.
//! 2. `execute_run` (async): hand the runnable entries to the scheduler and
//!    write a JSON run record.

use crate::benchmark::{BenchmarkOrchestrator, SweepAbortError};
use crate::cancel::CancelSignal;
use crate::classify::{classify_all, ClassificationWarning, SourceFile};
use crate::collector::RunSummary;
use crate::encode::EncodeInvoker;
use crate::layout::{OutputLayout, RUN_LOGS_DIR_NAME};
use crate::migrate::{migrate_legacy_proxies, Migration};
use crate::plan::{
    resolve_plan, ConflictPolicy, ConflictPrompt, ExecutionPlan, JobPlanEntry, PlanRequest,
    PlanningError, Resolution,
};
use crate::probe::MetadataProbe;
use crate::report::{Report, ReportError, SweetSpotThresholds};
use crate::scan::{scan_sources, ScanError};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::startup::StartupError;
use crate::system::{collect_system_info, SystemInfo};
use chrono::Local;
use log::{info, warn};
use proxyforge_config::{Codec, Config, Scale};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Exit code for a run interrupted by the operator
pub const EXIT_INTERRUPTED: u8 = 130;

/// Fatal errors of a generation or benchmark run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Scan(ScanError),

    #[error("No video files found in {0}")]
    NoVideoFiles(PathBuf),

    #[error("{0}")]
    Startup(#[from] StartupError),

    /// The encoder vanished mid-run. The summary holds every job's record.
    #[error("Encoder '{tool}' is not available; install ffmpeg and retry")]
    EncoderUnavailable {
        tool: String,
        summary: Box<RunSummary>,
        record_path: Option<PathBuf>,
    },

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Benchmark aborted: {0}")]
    SweepAborted(SweepAbortError),

    #[error("Interrupted")]
    Interrupted,

    #[error("{0}")]
    Report(#[from] ReportError),

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ScanError> for RunError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::NotAVideo(path) | ScanError::LooksLikeProxy(path) => {
                warn!("Not a usable source: {}", path.display());
                RunError::NoVideoFiles(path)
            }
            other => RunError::Scan(other),
        }
    }
}

impl From<SweepAbortError> for RunError {
    fn from(e: SweepAbortError) -> Self {
        match e {
            SweepAbortError::Interrupted { .. } => RunError::Interrupted,
            other => RunError::SweepAborted(other),
        }
    }
}

impl RunError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::NoVideoFiles(_) => 2,
            RunError::Startup(_) | RunError::EncoderUnavailable { .. } => 3,
            RunError::Planning(_) => 4,
            RunError::SweepAborted(_) => 5,
            RunError::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

/// Scanned and classified sources of a tree.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub layout: OutputLayout,
    pub sources: Vec<SourceFile>,
    pub warnings: Vec<ClassificationWarning>,
}

/// Scans `source` and classifies every candidate.
///
/// Fails with [`RunError::NoVideoFiles`] when nothing qualifies.
pub fn discover(
    source: &Path,
    config: &Config,
    probe: &dyn MetadataProbe,
) -> Result<Discovery, RunError> {
    let outcome = scan_sources(source, &config.scan)?;
    if outcome.candidates.is_empty() {
        return Err(RunError::NoVideoFiles(source.to_path_buf()));
    }

    let layout = OutputLayout::for_tree(&outcome.tree_root, &config.scan);
    let (sources, warnings) = classify_all(outcome.candidates, &config.scan.mobile_marker, probe);
    let mobile = sources.iter().filter(|s| s.is_mobile()).count();
    info!(
        "{} source file(s): {} mobile, {} standard",
        sources.len(),
        mobile,
        sources.len() - mobile
    );

    Ok(Discovery {
        layout,
        sources,
        warnings,
    })
}

/// A fully planned generation run, ready for the scheduler.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub source_path: PathBuf,
    pub discovery: Discovery,
    pub request: PlanRequest,
    /// Legacy proxies found before planning
    pub migrations: Vec<Migration>,
    pub plan: ExecutionPlan,
}

impl PreparedRun {
    pub fn runnable_count(&self) -> usize {
        self.plan.runnable().count()
    }
}

/// Scans, classifies, migrates legacy proxies, and resolves conflicts.
/// Nothing is encoded yet.
///
/// `probe` also validates existing proxies.
pub fn prepare_run(
    source: &Path,
    config: &Config,
    probe: &dyn MetadataProbe,
    prompt: &mut dyn ConflictPrompt,
) -> Result<PreparedRun, RunError> {
    let discovery = discover(source, config, probe)?;
    let request = PlanRequest {
        codec: config.proxy.codec,
        scale: config.proxy.scale,
    };
    let migrations = if config.proxy.migrate_legacy {
        migrate_legacy_proxies(&discovery.sources, &discovery.layout, probe)
    } else {
        Vec::new()
    };
    let plan = resolve_plan(
        &discovery.sources,
        request,
        &discovery.layout,
        probe,
        ConflictPolicy::from(config.proxy.on_conflict),
        prompt,
    )?;

    Ok(PreparedRun {
        source_path: source.to_path_buf(),
        discovery,
        request,
        migrations,
        plan,
    })
}

/// JSON record of one generation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub source_path: PathBuf,
    pub proxies_dir: PathBuf,
    pub codec: Codec,
    pub scale: Scale,
    pub system_info: SystemInfo,
    pub warnings: Vec<ClassificationWarning>,
    pub migrations: Vec<Migration>,
    /// Entries the plan resolved to skip
    pub skipped: Vec<JobPlanEntry>,
    pub summary: RunSummary,
}

impl RunRecord {
    /// Writes `run-<timestamp>.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, RunError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("run-{}.json", self.timestamp));
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Writes the record next to the tree root; failures are only logged.
    fn write_beside(&self, layout: &OutputLayout) -> Option<PathBuf> {
        match self.write_to(&layout.sibling_dir(RUN_LOGS_DIR_NAME)) {
            Ok(path) => {
                info!("Run record written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to write run record: {}", e);
                None
            }
        }
    }
}

/// Result of an executed generation run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub skipped: usize,
    pub duplicates: usize,
    pub record_path: Option<PathBuf>,
}

impl RunOutcome {
    /// 0 when every job succeeded, 130 when interrupted, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.summary.interrupted {
            EXIT_INTERRUPTED
        } else if self.summary.all_succeeded() {
            0
        } else {
            1
        }
    }
}

/// Local timestamp used in record and report file names
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Runs a prepared plan and writes the run record.
///
/// The record is written even when a missing encoder aborts the run.
pub async fn execute_run<I: EncodeInvoker>(
    prepared: PreparedRun,
    workers: u32,
    invoker: Arc<I>,
    cancel: CancelSignal,
) -> Result<RunOutcome, RunError> {
    let timestamp = file_timestamp();
    let layout = prepared.discovery.layout.clone();
    let skipped: Vec<JobPlanEntry> = prepared.plan.skipped().cloned().collect();
    let duplicates = prepared.plan.count(Resolution::Duplicate);

    std::fs::create_dir_all(layout.proxies_dir())?;
    let scheduler = Scheduler::new(workers);
    let (summary, missing_tool) = match scheduler
        .run(prepared.plan.into_runnable(), invoker, cancel)
        .await
    {
        Ok(summary) => (summary, None),
        Err(SchedulerError::ToolUnavailable { tool, summary }) => (*summary, Some(tool)),
        Err(SchedulerError::WorkerPanicked(message)) => return Err(RunError::Worker(message)),
    };

    let record = RunRecord {
        timestamp,
        source_path: prepared.source_path,
        proxies_dir: layout.proxies_dir().to_path_buf(),
        codec: prepared.request.codec,
        scale: prepared.request.scale,
        system_info: collect_system_info(),
        warnings: prepared.discovery.warnings,
        migrations: prepared.migrations,
        skipped,
        summary,
    };
    let record_path = record.write_beside(&layout);

    if let Some(tool) = missing_tool {
        return Err(RunError::EncoderUnavailable {
            tool,
            summary: Box::new(record.summary),
            record_path,
        });
    }

    Ok(RunOutcome {
        skipped: record.skipped.len(),
        duplicates,
        summary: record.summary,
        record_path,
    })
}

/// A completed benchmark.
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub report: Report,
    pub report_path: PathBuf,
}

/// Sweeps the benchmark matrix over `source` and writes the report.
pub async fn run_benchmark<I: EncodeInvoker>(
    source: &Path,
    config: &Config,
    probe: &dyn MetadataProbe,
    invoker: Arc<I>,
    cancel: CancelSignal,
) -> Result<BenchmarkOutcome, RunError> {
    let timestamp = file_timestamp();
    let discovery = discover(source, config, probe)?;

    let runs = BenchmarkOrchestrator::new(
        &discovery.sources,
        &discovery.layout,
        probe,
        config.proxy.scale,
        invoker,
    )
    .with_pause(Duration::from_secs(config.benchmark.pause_between_runs_secs))
    .run(cancel)
    .await?;

    let thresholds = SweetSpotThresholds {
        min_efficiency: config.benchmark.sweet_spot_min_efficiency,
        min_speedup: config.benchmark.sweet_spot_min_speedup,
    };
    let report = Report::build(
        collect_system_info(),
        timestamp,
        source.to_path_buf(),
        runs.iter().map(|r| r.result()).collect(),
        thresholds,
    );
    let report_path =
        report.write_to(&discovery.layout.sibling_dir(&config.benchmark.logs_dir_name))?;

    Ok(BenchmarkOutcome {
        report,
        report_path,
    })
}
