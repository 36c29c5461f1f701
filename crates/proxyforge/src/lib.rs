//! proxyforge
//!
//! Bulk generation of editing proxies for video source trees, plus a
//! benchmark sweep that finds the best worker count for each codec.

pub mod benchmark;
pub mod cancel;
pub mod classify;
pub mod collector;
pub mod encode;
pub mod jobs;
pub mod layout;
pub mod logging;
pub mod migrate;
pub mod orphans;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod prompt;
pub mod report;
pub mod scan;
pub mod scheduler;
pub mod shutdown;
pub mod startup;
pub mod system;

#[cfg(test)]
pub(crate) mod testutil;

pub use proxyforge_config as config;
pub use proxyforge_config::{Codec, Config, ConflictMode, Scale, WorkerPlan};

pub use benchmark::{
    configuration_matrix, BenchmarkConfiguration, BenchmarkOrchestrator, BenchmarkRun,
    SweepAbortError, SweepState,
};
pub use cancel::{cancel_on_ctrl_c, cancel_pair, CancelHandle, CancelSignal};
pub use classify::{classify_all, ClassificationWarning, DeviceClass, SourceFile};
pub use collector::{ResultCollector, RunSummary};
pub use encode::{EncodeError, EncodeInvoker, EncodeRequest, FfmpegInvoker};
pub use jobs::{Job, JobStatus};
pub use layout::OutputLayout;
pub use logging::init_logging;
pub use migrate::{migrate_legacy_proxies, Migration, MigrationOutcome};
pub use orphans::{delete_orphans, Orphan, OrphanError, OrphanScan, OrphanScanner};
pub use pipeline::{
    discover, execute_run, prepare_run, run_benchmark, BenchmarkOutcome, PreparedRun, RunError,
    RunOutcome, RunRecord,
};
pub use plan::{
    plan_clean_start, resolve_plan, ConflictChoice, ConflictPolicy, ConflictPrompt,
    ExecutionPlan, FixedChoice, JobPlanEntry, PlanningError, Resolution,
};
pub use probe::{MetadataProbe, ToolProbe};
pub use prompt::TerminalPrompt;
pub use report::{format_mm_ss, BenchmarkResult, CodecRecommendations, Report, ReportError};
pub use scan::{scan_sources, ScanError};
pub use scheduler::{Scheduler, SchedulerError};
pub use shutdown::{shutdown_after_countdown, ShutdownOutcome};
pub use startup::{run_startup_checks, StartupError};
pub use system::{collect_system_info, SystemInfo};
