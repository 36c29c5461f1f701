//! Job scheduler: runs the planned encodes on a bounded worker pool.
//!
//! A tokio [`Semaphore`] with one permit per worker bounds concurrency. Jobs
//! are dispatched in plan order; a job's failure is recorded and never stops
//! the others. Two things stop the run early:
//! - external cancellation (interrupt), which stops in-flight encodes
//! - a missing encoder, which makes every remaining job pointless
//!
//! Either way every runnable entry still ends up with exactly one record.

use crate::cancel::{cancel_pair, CancelHandle, CancelSignal};
use crate::collector::{ResultCollector, ResultSink, RunSummary};
use crate::encode::{EncodeError, EncodeInvoker};
use crate::jobs::Job;
use crate::plan::JobPlanEntry;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Error type for a scheduler run
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The encoder could not be launched; the run was aborted.
    #[error("Encoder '{tool}' is not available; run aborted")]
    ToolUnavailable {
        tool: String,
        /// Records of the aborted run
        summary: Box<RunSummary>,
    },

    /// A worker task panicked.
    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}

/// Bounded worker pool.
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    workers: u32,
}

impl Scheduler {
    /// A scheduler with `workers` concurrent slots (at least one)
    pub fn new(workers: u32) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers as usize)),
            workers,
        }
    }

    pub fn workers(&self) -> u32 {
        self.workers
    }

    /// Runs `entries` to completion.
    ///
    /// Entries must already be resolved; the scheduler never looks at the
    /// destination directory. Results come back in plan order.
    pub async fn run<I: EncodeInvoker>(
        &self,
        entries: Vec<JobPlanEntry>,
        invoker: Arc<I>,
        cancel: CancelSignal,
    ) -> Result<RunSummary, SchedulerError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            "Running {} job(s) on {} worker(s)",
            entries.len(),
            self.workers
        );

        let (sink, collector) = ResultCollector::new(entries.len());
        let collecting = tokio::spawn(collector.collect());

        // Internal abort: fired by external cancellation or a fatal encoder error
        let (abort, abort_signal) = cancel_pair();
        let forward = {
            let mut external = cancel.clone();
            let abort = abort.clone();
            tokio::spawn(async move {
                external.cancelled().await;
                abort.cancel();
            })
        };

        let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let mut tasks = JoinSet::new();
        let mut pending = entries.into_iter().enumerate();

        for (index, entry) in pending.by_ref() {
            let mut job = Job::new(index, entry);

            let permit = {
                let mut waiting = abort_signal.clone();
                tokio::select! {
                    biased;
                    _ = waiting.cancelled() => None,
                    permit = self.semaphore.clone().acquire_owned() => permit.ok(),
                }
            };
            let Some(permit) = permit else {
                job.cancel();
                let _ = sink.send(job);
                break;
            };

            debug!("Dispatching job {} ({})", index, job.source().display());
            tasks.spawn(run_job(
                job,
                invoker.clone(),
                abort.clone(),
                abort_signal.clone(),
                fatal.clone(),
                sink.clone(),
                permit,
            ));
        }

        // Anything never dispatched was cut off by the abort
        for (index, entry) in pending {
            let mut job = Job::new(index, entry);
            job.cancel();
            let _ = sink.send(job);
        }

        let mut panicked = None;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
                panicked.get_or_insert_with(|| e.to_string());
            }
        }
        forward.abort();
        drop(sink);

        let jobs = collecting
            .await
            .map_err(|e| SchedulerError::WorkerPanicked(e.to_string()))?;
        if let Some(message) = panicked {
            return Err(SchedulerError::WorkerPanicked(message));
        }

        let summary = RunSummary {
            workers: self.workers,
            started_at,
            wall_time_secs: clock.elapsed().as_secs_f64(),
            jobs,
            interrupted: cancel.is_cancelled(),
        };
        info!(
            "Run finished in {:.1}s: {} succeeded, {} failed, {} cancelled",
            summary.wall_time_secs,
            summary.succeeded(),
            summary.failed(),
            summary.cancelled()
        );

        let missing_tool = fatal.lock().ok().and_then(|mut guard| guard.take());
        match missing_tool {
            Some(tool) => Err(SchedulerError::ToolUnavailable {
                tool,
                summary: Box::new(summary),
            }),
            None => Ok(summary),
        }
    }
}

async fn run_job<I: EncodeInvoker>(
    mut job: Job,
    invoker: Arc<I>,
    abort: CancelHandle,
    abort_signal: CancelSignal,
    fatal: Arc<Mutex<Option<String>>>,
    sink: ResultSink,
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    if abort_signal.is_cancelled() {
        job.cancel();
    } else {
        job.start();
        let request = job.request();
        match invoker.encode(&request, abort_signal).await {
            Ok(report) => job.succeed(report),
            Err(EncodeError::Cancelled) => job.cancel(),
            Err(e) if e.is_fatal() => {
                error!("{}; aborting run", e);
                let tool = match &e {
                    EncodeError::ToolUnavailable { tool } => tool.clone(),
                    other => other.to_string(),
                };
                if let Ok(mut guard) = fatal.lock() {
                    guard.get_or_insert(tool);
                }
                abort.cancel();
                job.fail(&e);
            }
            Err(e) => {
                warn!("Encode of {} failed: {}", job.source().display(), e);
                job.fail(&e);
            }
        }
    }

    let _ = sink.send(job);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::testutil::{plan_entry, FakeInvoker};
    use proptest::prelude::*;
    use std::time::Duration;

    fn entries(n: usize) -> Vec<JobPlanEntry> {
        (0..n).map(|i| plan_entry(&format!("clip{:03}", i))).collect()
    }

    #[test]
    fn test_scheduler_worker_count() {
        assert_eq!(Scheduler::new(3).workers(), 3);
        // Zero workers still makes progress
        assert_eq!(Scheduler::new(0).workers(), 1);
    }

    #[tokio::test]
    async fn test_pool_saturates_to_worker_count() {
        let invoker = Arc::new(FakeInvoker::with_delay(Duration::from_millis(40)));
        let scheduler = Scheduler::new(3);

        let summary = scheduler
            .run(entries(7), invoker.clone(), CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(invoker.max_active(), 3);
        assert_eq!(summary.job_count(), 7);
        assert!(summary.all_succeeded());
        assert!(!summary.interrupted);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let mut fake = FakeInvoker::with_delay(Duration::from_millis(5));
        fake.failing.insert("clip001.mov".to_string());
        let invoker = Arc::new(fake);

        let summary = Scheduler::new(2)
            .run(entries(4), invoker.clone(), CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(invoker.calls(), 4);
        assert_eq!(summary.succeeded(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.jobs[1].status, JobStatus::Failed);
        assert!(summary.jobs[1]
            .error
            .as_deref()
            .unwrap()
            .contains("cannot decode"));
    }

    #[tokio::test]
    async fn test_missing_encoder_aborts_run() {
        let invoker = Arc::new(FakeInvoker {
            tool_missing: true,
            ..Default::default()
        });

        let result = Scheduler::new(1)
            .run(entries(5), invoker.clone(), CancelSignal::never())
            .await;

        match result {
            Err(SchedulerError::ToolUnavailable { tool, summary }) => {
                assert_eq!(tool, "ffmpeg");
                assert_eq!(summary.job_count(), 5);
                assert_eq!(summary.failed(), 1);
                assert_eq!(summary.cancelled(), 4);
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.job_count())),
        }
        // Only the first job ever reached the encoder
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_jobs() {
        let invoker = Arc::new(FakeInvoker::with_delay(Duration::from_secs(30)));
        let (handle, signal) = cancel_pair();

        let run = tokio::spawn(async move {
            Scheduler::new(2).run(entries(6), invoker, signal).await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.job_count(), 6);
        assert_eq!(summary.cancelled(), 6);
        assert_eq!(summary.succeeded(), 0);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let invoker = Arc::new(FakeInvoker::default());
        let summary = Scheduler::new(4)
            .run(Vec::new(), invoker, CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(summary.job_count(), 0);
    }

    // *For any* worker count and job count, the scheduler never runs more than
    // the worker count concurrently and produces exactly one record per entry,
    // in plan order.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_concurrency_bounded(workers in 1u32..=8, jobs in 0usize..16) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();
            let invoker = Arc::new(FakeInvoker::with_delay(Duration::from_millis(2)));

            let summary = rt
                .block_on(Scheduler::new(workers).run(entries(jobs), invoker.clone(), CancelSignal::never()))
                .unwrap();

            prop_assert!(invoker.max_active() <= workers as usize);
            prop_assert_eq!(summary.job_count(), jobs);
            prop_assert!(summary.jobs.iter().enumerate().all(|(i, j)| j.index == i));
            prop_assert_eq!(summary.workers, workers);
        }
    }
}
