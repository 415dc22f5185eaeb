//! Job persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::types::{Job, JobId, JobStatus};

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Count of jobs per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl JobStats {
    fn count(&mut self, status: &JobStatus) {
        let slot = match status {
            JobStatus::Queued => &mut self.queued,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed { .. } => &mut self.failed,
            JobStatus::TimedOut { .. } => &mut self.timed_out,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed + self.timed_out
    }
}

/// Where queued jobs live between enqueue and execution.
///
/// Listings are in enqueue order.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Replace a stored job; it must already exist.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Atomically move the oldest queued job (of `queue`, if given) to
    /// running and return it.
    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError>;

    /// Jobs in the same state as `status` (payload ignored), or all jobs.
    fn list_by_status(&self, status: Option<JobStatus>, limit: usize)
    -> Result<Vec<Job>, JobStoreError>;

    /// Failed and timed-out jobs: the failure log of background work.
    fn failures(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(queue)
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize)
    -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(status, limit)
    }

    fn failures(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).failures(limit)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

#[derive(Debug, Default)]
struct JobTable {
    jobs: HashMap<JobId, Job>,
    /// Enqueue order.
    order: Vec<JobId>,
}

impl JobTable {
    fn in_order(&self) -> impl Iterator<Item = &Job> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    fn collect(&self, limit: usize, keep: impl Fn(&Job) -> bool) -> Vec<Job> {
        self.in_order().filter(|j| keep(j)).take(limit).cloned().collect()
    }
}

/// Job store backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    table: RwLock<JobTable>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, JobTable>, JobStoreError> {
        self.table.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, JobTable>, JobStoreError> {
        self.table.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job table lock poisoned".into())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut table = self.write()?;
        let id = job.id;
        if table.jobs.contains_key(&id) {
            return Err(JobStoreError::AlreadyExists(id));
        }
        table.jobs.insert(id, job);
        table.order.push(id);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.read()?.jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut table = self.write()?;
        let slot = table
            .jobs
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, queue: Option<&str>) -> Result<Option<Job>, JobStoreError> {
        let mut table = self.write()?;
        let Some(id) = table
            .in_order()
            .find(|j| j.status == JobStatus::Queued && queue.is_none_or(|q| j.queue == q))
            .map(|j| j.id)
        else {
            return Ok(None);
        };

        Ok(table.jobs.get_mut(&id).map(|job| {
            job.start();
            job.clone()
        }))
    }

    fn list_by_status(&self, status: Option<JobStatus>, limit: usize)
    -> Result<Vec<Job>, JobStoreError> {
        let label = status.as_ref().map(JobStatus::label);
        Ok(self
            .read()?
            .collect(limit, |j| label.is_none_or(|l| j.status.label() == l)))
    }

    fn failures(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        Ok(self.read()?.collect(limit, |j| j.status.is_failure()))
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let table = self.read()?;
        let mut stats = JobStats::default();
        table.jobs.values().for_each(|j| stats.count(&j.status));
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;
    use chrono::Utc;
    use serde_json::json;

    fn job(queue: &str) -> Job {
        Job::new(queue, JobKind::new("accounting.closing_voucher"), json!({}))
    }

    #[test]
    fn claims_in_enqueue_order() {
        let store = InMemoryJobStore::new();
        let first = store.enqueue(job("long")).unwrap();
        let second = store.enqueue(job("long")).unwrap();

        let claimed = store.claim_next(None).unwrap().unwrap();
        assert_eq!((claimed.id, claimed.attempt), (first, 1));
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(store.claim_next(None).unwrap().unwrap().id, second);
        assert!(store.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn claim_is_scoped_to_queue() {
        let store = InMemoryJobStore::new();
        store.enqueue(job("default")).unwrap();
        let long = store.enqueue(job("long")).unwrap();

        assert_eq!(store.claim_next(Some("long")).unwrap().unwrap().id, long);
        assert!(store.claim_next(Some("long")).unwrap().is_none());
        assert!(store.claim_next(Some("default")).unwrap().is_some());
    }

    #[test]
    fn enqueue_twice_is_rejected() {
        let store = InMemoryJobStore::new();
        let j = job("long");
        store.enqueue(j.clone()).unwrap();
        assert!(matches!(store.enqueue(j), Err(JobStoreError::AlreadyExists(_))));
    }

    #[test]
    fn update_requires_existing_job() {
        let store = InMemoryJobStore::new();
        assert!(matches!(store.update(&job("long")), Err(JobStoreError::NotFound(_))));
    }

    #[test]
    fn failed_jobs_stay_out_of_the_queue() {
        let store = InMemoryJobStore::new();
        store.enqueue(job("long")).unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        claimed.fail(Utc::now(), "account frozen");
        store.update(&claimed).unwrap();

        let failures = store.failures(10).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, claimed.id);
        assert_eq!(
            store
                .list_by_status(Some(JobStatus::Failed { error: String::new() }), 10)
                .unwrap()
                .len(),
            1
        );
        assert!(store.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn stats_follow_claims() {
        let store = InMemoryJobStore::new();
        for _ in 0..5 {
            store.enqueue(job("long")).unwrap();
        }
        store.claim_next(None).unwrap();
        store.claim_next(None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!((stats.queued, stats.running, stats.total()), (3, 2, 5));
        assert_eq!(store.list_by_status(None, 4).unwrap().len(), 4);
    }
}
