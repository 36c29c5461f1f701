//! Result collection for a scheduler run.
//!
//! Workers send finished [`Job`]s over a channel; the collector owns the only
//! copy of the results, so no shared mutable state is needed between workers.

use crate::jobs::{Job, JobStatus};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// Worker count the run used
    pub workers: u32,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from first dispatch to last completion
    pub wall_time_secs: f64,
    /// One record per runnable plan entry, in plan order
    pub jobs: Vec<Job>,
    /// Whether the run was stopped by an interrupt
    pub interrupted: bool,
}

impl RunSummary {
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(JobStatus::Cancelled)
    }

    /// Whether every job produced a proxy
    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.job_count()
    }
}

/// Accumulates job results as workers report them.
#[derive(Debug)]
pub struct ResultCollector {
    rx: mpsc::UnboundedReceiver<Job>,
    expected: usize,
}

/// Sending half handed to each worker.
pub type ResultSink = mpsc::UnboundedSender<Job>;

impl ResultCollector {
    /// A collector expecting `expected` results, and the sink to feed it
    pub fn new(expected: usize) -> (ResultSink, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, expected })
    }

    /// Receives results until every sink is dropped.
    ///
    /// Returns the jobs in plan order.
    pub async fn collect(mut self) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(self.expected);

        while let Some(job) = self.rx.recv().await {
            let done = jobs.len() + 1;
            match job.status {
                JobStatus::Succeeded => info!(
                    "[{}/{}] {} -> {} ({:.1}s)",
                    done,
                    self.expected,
                    job.source().display(),
                    job.entry.destination.display(),
                    job.duration_secs.unwrap_or(0.0)
                ),
                JobStatus::Failed => warn!(
                    "[{}/{}] {} failed: {}",
                    done,
                    self.expected,
                    job.source().display(),
                    job.error.as_deref().unwrap_or("unknown error")
                ),
                _ => {}
            }
            jobs.push(job);
        }

        if jobs.len() != self.expected {
            warn!(
                "Collected {} result(s), expected {}",
                jobs.len(),
                self.expected
            );
        }

        jobs.sort_by_key(|j| j.index);
        jobs
    }
}
