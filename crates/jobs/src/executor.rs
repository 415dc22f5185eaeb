//! Running queued jobs.
//!
//! A job runs on its own worker thread so the caller can stop waiting once the
//! job's timeout elapses. The job's [`CancelToken`] is then cancelled; the
//! handler is expected to stop before its next side effect, and whatever it
//! returns afterwards is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::store::{JobStore, JobStoreError};
use crate::types::{CancelToken, Job, JobKind, JobResult};

pub type JobHandler = Arc<dyn Fn(&Job, &CancelToken) -> JobResult + Send + Sync>;

const WILDCARD: &str = "*";

/// Handlers keyed by kind pattern: an exact kind, a category (`"accounting.*"`)
/// or `"*"`. The most specific pattern wins.
#[derive(Default)]
struct HandlerRegistry {
    by_pattern: HashMap<String, JobHandler>,
}

impl HandlerRegistry {
    fn insert(&mut self, pattern: String, handler: JobHandler) {
        self.by_pattern.insert(pattern, handler);
    }

    fn resolve(&self, kind: &JobKind) -> Option<JobHandler> {
        let exact = std::iter::once(kind.as_str().to_string());
        let categories = kind.categories().map(|c| format!("{c}.*"));
        exact
            .chain(categories)
            .chain(std::iter::once(WILDCARD.to_string()))
            .find_map(|pattern| self.by_pattern.get(&pattern).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    /// Thread name, also used in log fields.
    pub name: String,
    /// Restrict claims to one queue.
    pub queue: Option<String>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "acctkit-jobs".into(),
            queue: None,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// How one execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// Counters of a spawned executor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: Result<&ExecutionOutcome, &JobStoreError>) {
        self.jobs_processed += 1;
        let counter = match outcome {
            Ok(ExecutionOutcome::Succeeded) => &mut self.jobs_succeeded,
            Ok(ExecutionOutcome::TimedOut) => &mut self.jobs_timed_out,
            Ok(ExecutionOutcome::Failed(_)) | Err(_) => &mut self.jobs_failed,
        };
        *counter += 1;
    }
}

/// Control handle for [`JobExecutor::spawn`].
#[derive(Debug)]
pub struct JobExecutorHandle {
    stop: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Stop polling after the current job and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Executes claimed jobs with registered handlers. Nothing is retried.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HandlerRegistry,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HandlerRegistry::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job, &CancelToken) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Arc::new(handler));
    }

    /// Run an already claimed job and store its final state.
    pub fn execute_one(&self, job: &mut Job) -> Result<ExecutionOutcome, JobStoreError> {
        let started_at = Utc::now();
        let outcome = match self.handlers.resolve(&job.kind) {
            None => ExecutionOutcome::Failed(format!("no handler for job kind: {}", job.kind)),
            Some(handler) => match run_bounded(handler, job) {
                Some(JobResult::Success) => ExecutionOutcome::Succeeded,
                Some(JobResult::Failure(error)) => ExecutionOutcome::Failed(error),
                None => ExecutionOutcome::TimedOut,
            },
        };

        match &outcome {
            ExecutionOutcome::Succeeded => {
                debug!(job_id = %job.id, kind = %job.kind, "job completed");
                job.complete(started_at);
            }
            ExecutionOutcome::Failed(reason) => {
                warn!(job_id = %job.id, kind = %job.kind, error = %reason, "job failed");
                job.fail(started_at, reason.clone());
            }
            ExecutionOutcome::TimedOut => {
                error!(job_id = %job.id, kind = %job.kind, timeout_secs = job.timeout.as_secs(), "job timed out");
                job.time_out(started_at);
            }
        }

        self.store.update(job)?;
        Ok(outcome)
    }

    /// Drain `queue` (or every queue) on the calling thread.
    ///
    /// Returns the number of jobs executed.
    pub fn run_pending(&self, queue: Option<&str>) -> Result<usize, JobStoreError> {
        let mut executed = 0;
        while let Some(mut job) = self.store.claim_next(queue)? {
            self.execute_one(&mut job)?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Poll the store from a background thread until the handle is shut down.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (stop, stopped) = mpsc::channel();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let shared = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || self.poll(&config, &stopped, &shared))?;

        Ok(JobExecutorHandle {
            stop,
            thread: Some(thread),
            stats,
        })
    }

    fn poll(
        &self,
        config: &JobExecutorConfig,
        stopped: &mpsc::Receiver<()>,
        stats: &Mutex<ExecutorStats>,
    ) {
        info!(executor = %config.name, queue = ?config.queue, "job executor started");
        let started = Instant::now();

        while stopped.try_recv().is_err() {
            let claimed = self.store.claim_next(config.queue.as_deref());
            let mut job = match claimed {
                Ok(Some(job)) => job,
                Ok(None) => {
                    thread::sleep(config.poll_interval);
                    continue;
                }
                Err(e) => {
                    error!(executor = %config.name, error = %e, "claim failed");
                    thread::sleep(config.poll_interval);
                    continue;
                }
            };

            let result = self.execute_one(&mut job);
            if let Err(e) = &result {
                error!(executor = %config.name, job_id = %job.id, error = %e, "job outcome not stored");
            }
            if let Ok(mut s) = stats.lock() {
                s.record(result.as_ref());
                s.uptime_secs = started.elapsed().as_secs();
            }
        }

        info!(executor = %config.name, "job executor stopped");
    }
}

/// `None` when the job's timeout elapsed before the handler returned; the
/// handler's token is cancelled at that point.
/// A panicking handler drops its sender and is reported as a failure.
fn run_bounded(handler: JobHandler, job: &Job) -> Option<JobResult> {
    let (done, result) = mpsc::sync_channel(1);
    let owned = job.clone();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name(format!("job-{}", job.id))
        .spawn(move || {
            let _ = done.send(handler(&owned, &worker_cancel));
        });
    if let Err(e) = worker {
        return Some(JobResult::Failure(format!("cannot start job worker: {e}")));
    }

    match result.recv_timeout(job.timeout) {
        Ok(result) => Some(result),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            cancel.cancel();
            None
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Some(JobResult::Failure("job handler panicked".into()))
        }
    }
}
