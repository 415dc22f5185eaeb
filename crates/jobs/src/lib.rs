//! Background job queue for work too heavy for the submitting call.
//!
//! Jobs go to a named queue with a JSON payload and a fixed timeout. Nothing
//! is retried: a failed or timed-out job stays that way and shows up in
//! [`JobStore::failures`], the only place background errors surface once the
//! submitter has returned.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutionOutcome, ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{CancelToken, Job, JobId, JobKind, JobResult, JobRun, JobStatus};
