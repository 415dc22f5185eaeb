//! Background processing of large vouchers through the job queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use acctkit_jobs::{CancelToken, Job, JobExecutor, JobId, JobKind, JobResult, JobStore};

use crate::closing::ClosingVoucherProcessor;
use crate::ports::{ClosingJob, ClosingQueue, Ledger, QueueError};

/// Job kind under which closing vouchers are enqueued.
pub const CLOSING_JOB_KIND: &str = "accounting.closing_voucher";

/// [`ClosingQueue`] backed by a [`JobStore`].
#[derive(Debug, Clone)]
pub struct JobQueue<S> {
    store: S,
}

impl<S: JobStore> JobQueue<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: JobStore> ClosingQueue for JobQueue<S> {
    fn enqueue(&self, job: ClosingJob, queue: &str, timeout: Duration) -> Result<JobId, QueueError> {
        let payload = serde_json::to_value(&job).map_err(|e| QueueError(e.to_string()))?;
        let job = Job::new(queue, JobKind::new(CLOSING_JOB_KIND), payload).with_timeout(timeout);
        self.store.enqueue(job).map_err(|e| QueueError(e.to_string()))
    }
}

/// Register the handler that generates entries for enqueued vouchers.
///
/// A run fails when the payload is unreadable, when generation returns an
/// error, or when any account ends up failed under the best-effort policy.
/// Generation stops posting once the executor gives up on the job.
pub fn register_closing_handler<S, L, Q>(
    executor: &mut JobExecutor<S>,
    processor: Arc<ClosingVoucherProcessor<L, Q>>,
) where
    S: JobStore + 'static,
    L: Ledger + 'static,
    Q: ClosingQueue + 'static,
{
    executor.register_handler(CLOSING_JOB_KIND, move |job: &Job, cancel: &CancelToken| {
        let request: ClosingJob = match job.decode_payload() {
            Ok(request) => request,
            Err(e) => return JobResult::Failure(format!("invalid closing job payload: {e}")),
        };

        match processor.generate_entries_until(&request.voucher, cancel) {
            Ok(report) if report.is_complete() => JobResult::Success,
            Ok(report) => {
                let failed: Vec<String> = report
                    .failed()
                    .map(|o| o.account.to_string())
                    .collect();
                warn!(voucher = %request.voucher.name, failed = ?failed, "closing job finished with failures");
                JobResult::Failure(format!(
                    "{} of {} accounts failed: {}",
                    failed.len(),
                    report.outcomes.len(),
                    failed.join(", ")
                ))
            }
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });
}
