//! Job records: one per runnable plan entry, tracking its encode lifecycle.

use crate::encode::{AudioHandling, EncodeError, EncodeReport, EncodeRequest};
use crate::plan::JobPlanEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker.
    #[default]
    Queued,
    /// Encode in progress.
    Running,
    /// Proxy written.
    Succeeded,
    /// Encode failed; the run continues.
    Failed,
    /// Never finished because the run was cancelled.
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One encode and its outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    /// Unique job identifier
    pub id: Uuid,
    /// Position in the execution plan
    pub index: usize,
    pub entry: JobPlanEntry,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Encode wall time in seconds
    pub duration_secs: Option<f64>,
    pub audio: Option<AudioHandling>,
    pub output_bytes: Option<u64>,
    /// Failure or cancellation reason
    pub error: Option<String>,
}

impl Job {
    pub fn new(index: usize, entry: JobPlanEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            entry,
            status: JobStatus::Queued,
            started_at: None,
            finished_at: None,
            duration_secs: None,
            audio: None,
            output_bytes: None,
            error: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.entry.source.path
    }

    /// The encode this job performs
    pub fn request(&self) -> EncodeRequest {
        EncodeRequest {
            source: self.entry.source.path.clone(),
            destination: self.entry.destination.clone(),
            codec: self.entry.codec,
            scale: self.entry.scale,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    fn finish(&mut self, status: JobStatus) {
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_secs = self
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0);
    }

    pub fn succeed(&mut self, report: EncodeReport) {
        self.audio = Some(report.audio);
        self.output_bytes = Some(report.output_bytes);
        self.finish(JobStatus::Succeeded);
    }

    pub fn fail(&mut self, error: &EncodeError) {
        self.error = Some(error.to_string());
        self.finish(JobStatus::Failed);
    }

    /// Marks the job cancelled, whether or not it had started
    pub fn cancel(&mut self) {
        self.error = Some("cancelled".to_string());
        self.finish(JobStatus::Cancelled);
    }
}
