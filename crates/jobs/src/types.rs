//! Job records.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job identifier. UUIDv7, so ids sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Dotted job kind (`"accounting.closing_voucher"`); routes a job to its handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKind(String);

impl JobKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every dotted prefix, longest first: `a.b.c` yields `a.b`, then `a`.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        let kind = self.0.as_str();
        kind.rmatch_indices('.').map(move |(i, _)| &kind[..i])
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    /// The handler returned an error or panicked.
    Failed { error: String },
    /// The handler was abandoned after the job's timeout.
    TimedOut { after_secs: u64 },
}

impl JobStatus {
    /// No further transition will happen; jobs are never retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// One execution of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when the run succeeded.
    pub error: Option<String>,
}

impl JobRun {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.finished_at - self.started_at
    }
}

/// Queued unit of background work with a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Named queue, e.g. `"long"` for heavy accounting work.
    pub queue: String,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Wall-clock limit for one run.
    pub timeout: Duration,
    /// Times the job was claimed.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<JobRun>,
}

impl Job {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(queue: impl Into<String>, kind: JobKind, payload: serde_json::Value) -> Self {
        let created_at = Utc::now();
        Self {
            id: JobId::new(),
            queue: queue.into(),
            kind,
            payload,
            status: JobStatus::Queued,
            timeout: Self::DEFAULT_TIMEOUT,
            attempt: 0,
            created_at,
            updated_at: created_at,
            history: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Queued → Running.
    pub fn start(&mut self) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, started_at: DateTime<Utc>) {
        self.close_run(started_at, JobStatus::Completed);
    }

    pub fn fail(&mut self, started_at: DateTime<Utc>, error: impl Into<String>) {
        self.close_run(started_at, JobStatus::Failed { error: error.into() });
    }

    pub fn time_out(&mut self, started_at: DateTime<Utc>) {
        let after_secs = self.timeout.as_secs();
        self.close_run(started_at, JobStatus::TimedOut { after_secs });
    }

    fn close_run(&mut self, started_at: DateTime<Utc>, status: JobStatus) {
        let finished_at = Utc::now();
        let error = match &status {
            JobStatus::Failed { error } => Some(error.clone()),
            JobStatus::TimedOut { after_secs } => Some(format!("timed out after {after_secs}s")),
            _ => None,
        };
        self.history.push(JobRun {
            started_at,
            finished_at,
            error,
        });
        self.status = status;
        self.updated_at = finished_at;
    }

    /// Typed view of the payload.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Stop signal shared with a running handler.
///
/// The executor cancels it once the job's timeout has elapsed; handlers doing
/// several side effects check it between them and stop early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a handler reports back for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failure(String),
}

impl<E: std::fmt::Display> From<Result<(), E>> for JobResult {
    fn from(result: Result<(), E>) -> Self {
        result.map_or_else(|e| Self::Failure(e.to_string()), |()| Self::Success)
    }
}
