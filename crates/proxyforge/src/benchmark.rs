//! Benchmark orchestrator
//!
//! Sweeps the fixed codec x worker-count matrix strictly one configuration at
//! a time. Each configuration starts from an empty proxies directory and
//! encodes the same source set, so timings are comparable. A fatal error in
//! any configuration aborts the whole sweep and nothing is reported.

use crate::cancel::CancelSignal;
use crate::classify::SourceFile;
use crate::collector::RunSummary;
use crate::encode::EncodeInvoker;
use crate::layout::OutputLayout;
use crate::probe::MetadataProbe;
use crate::plan::{
    plan_clean_start, resolve_plan, ConflictChoice, ConflictPolicy, FixedChoice, PlanRequest,
    PlanningError,
};
use crate::report::BenchmarkResult;
use crate::scheduler::{Scheduler, SchedulerError};
use log::{info, warn};
use proxyforge_config::{Codec, Scale};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Codecs every sweep measures
pub const BENCHMARK_CODECS: [Codec; 2] = [Codec::H264, Codec::Prores];

/// Worker counts every sweep measures; 1 is the baseline
pub const WORKER_COUNTS: [u32; 4] = [1, 2, 6, 8];

/// One point of the sweep matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BenchmarkConfiguration {
    pub codec: Codec,
    pub workers: u32,
}

impl std::fmt::Display for BenchmarkConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} with {} worker(s)", self.codec, self.workers)
    }
}

/// The full matrix in execution order: codec-major, ascending workers.
pub fn configuration_matrix() -> Vec<BenchmarkConfiguration> {
    BENCHMARK_CODECS
        .iter()
        .flat_map(|&codec| {
            WORKER_COUNTS
                .iter()
                .map(move |&workers| BenchmarkConfiguration { codec, workers })
        })
        .collect()
}

/// Why a sweep stopped early. Collected runs are discarded.
#[derive(Debug, Error)]
pub enum SweepAbortError {
    /// The encoder is missing; no configuration can produce data.
    #[error("Configuration '{configuration}' failed: encoder '{tool}' is not available")]
    ToolUnavailable {
        configuration: BenchmarkConfiguration,
        tool: String,
    },

    /// Proxies from the previous configuration could not be removed.
    #[error("Configuration '{configuration}' failed: could not clean {path}: {source}")]
    Cleanup {
        configuration: BenchmarkConfiguration,
        path: String,
        source: io::Error,
    },

    #[error("Configuration '{configuration}' failed: {source}")]
    Planning {
        configuration: BenchmarkConfiguration,
        source: PlanningError,
    },

    #[error("Configuration '{configuration}' failed: {message}")]
    Worker {
        configuration: BenchmarkConfiguration,
        message: String,
    },

    /// The operator interrupted the sweep.
    #[error("Sweep interrupted during '{configuration}'")]
    Interrupted {
        configuration: BenchmarkConfiguration,
    },
}

/// Progress of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// Nothing started yet
    Idle,
    /// Removing the previous configuration's proxies
    Cleaning(BenchmarkConfiguration),
    /// Scheduler active for this configuration
    Running(BenchmarkConfiguration),
    /// Configuration measured; waiting before the next one
    Recorded(BenchmarkConfiguration),
    Completed,
    Aborted(BenchmarkConfiguration),
}

/// One measured configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRun {
    pub configuration: BenchmarkConfiguration,
    pub summary: RunSummary,
}

impl BenchmarkRun {
    /// Raw measurement; derived metrics are filled in by the report
    pub fn result(&self) -> BenchmarkResult {
        BenchmarkResult::measured(
            self.configuration.codec,
            self.configuration.workers,
            self.summary.wall_time_secs,
            self.summary.job_count(),
            self.summary.failed(),
        )
    }
}

/// Deletes every generated proxy of a tree. Missing directory is fine.
pub fn purge_proxies(proxies_dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(proxies_dir) {
        Ok(()) => {
            info!("Removed {}", proxies_dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Drives a sweep over a fixed source set.
pub struct BenchmarkOrchestrator<'a, I> {
    sources: &'a [SourceFile],
    layout: &'a OutputLayout,
    validator: &'a dyn MetadataProbe,
    scale: Scale,
    invoker: Arc<I>,
    pause: Duration,
    matrix: Vec<BenchmarkConfiguration>,
    state: SweepState,
}

impl<'a, I: EncodeInvoker> BenchmarkOrchestrator<'a, I> {
    pub fn new(
        sources: &'a [SourceFile],
        layout: &'a OutputLayout,
        validator: &'a dyn MetadataProbe,
        scale: Scale,
        invoker: Arc<I>,
    ) -> Self {
        Self {
            sources,
            layout,
            validator,
            scale,
            invoker,
            pause: Duration::from_secs(2),
            matrix: configuration_matrix(),
            state: SweepState::Idle,
        }
    }

    /// Pause between configurations
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Replaces the configuration matrix (tests use smaller sweeps)
    pub fn with_matrix(mut self, matrix: Vec<BenchmarkConfiguration>) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    fn transition(&mut self, next: SweepState) {
        log::debug!("Sweep state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn abort(&mut self, error: SweepAbortError, configuration: BenchmarkConfiguration) -> SweepAbortError {
        warn!("Benchmark sweep aborted: {}", error);
        self.transition(SweepState::Aborted(configuration));
        error
    }

    /// Runs every configuration in order.
    pub async fn run(&mut self, cancel: CancelSignal) -> Result<Vec<BenchmarkRun>, SweepAbortError> {
        let total = self.matrix.len();
        let mut runs = Vec::with_capacity(total);
        let matrix = self.matrix.clone();

        for (i, configuration) in matrix.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.abort(SweepAbortError::Interrupted { configuration }, configuration));
            }
            info!("[{}/{}] Benchmarking {}", i + 1, total, configuration);

            self.transition(SweepState::Cleaning(configuration));
            if let Err(source) = purge_proxies(self.layout.proxies_dir()) {
                let error = SweepAbortError::Cleanup {
                    configuration,
                    path: self.layout.proxies_dir().display().to_string(),
                    source,
                };
                return Err(self.abort(error, configuration));
            }

            let request = PlanRequest {
                codec: configuration.codec,
                scale: self.scale,
            };
            // The first configuration goes through the full resolver; afterwards
            // the purge guarantees there is nothing to collide with
            let plan = if i == 0 {
                match resolve_plan(
                    self.sources,
                    request,
                    self.layout,
                    self.validator,
                    ConflictPolicy::DuplicateAll,
                    &mut FixedChoice(ConflictChoice::DuplicateAll),
                ) {
                    Ok(plan) => plan,
                    Err(source) => {
                        let error = SweepAbortError::Planning {
                            configuration,
                            source,
                        };
                        return Err(self.abort(error, configuration));
                    }
                }
            } else {
                plan_clean_start(self.sources, request, self.layout)
            };

            self.transition(SweepState::Running(configuration));
            let scheduler = Scheduler::new(configuration.workers);
            let summary = match scheduler
                .run(plan.into_runnable(), self.invoker.clone(), cancel.clone())
                .await
            {
                Ok(summary) => summary,
                Err(SchedulerError::ToolUnavailable { tool, .. }) => {
                    let error = SweepAbortError::ToolUnavailable {
                        configuration,
                        tool,
                    };
                    return Err(self.abort(error, configuration));
                }
                Err(SchedulerError::WorkerPanicked(message)) => {
                    let error = SweepAbortError::Worker {
                        configuration,
                        message,
                    };
                    return Err(self.abort(error, configuration));
                }
            };

            if summary.interrupted {
                return Err(self.abort(SweepAbortError::Interrupted { configuration }, configuration));
            }
            if summary.failed() > 0 {
                warn!(
                    "{}: {} of {} file(s) failed",
                    configuration,
                    summary.failed(),
                    summary.job_count()
                );
            }
            info!(
                "{} finished in {:.1}s",
                configuration, summary.wall_time_secs
            );

            runs.push(BenchmarkRun {
                configuration,
                summary,
            });
            self.transition(SweepState::Recorded(configuration));

            if i + 1 < total && !self.pause.is_zero() {
                let mut waiting = cancel.clone();
                tokio::select! {
                    _ = tokio::time::sleep(self.pause) => {}
                    _ = waiting.cancelled() => {}
                }
            }
        }

        self.transition(SweepState::Completed);
        Ok(runs)
    }
}
