//! Job queue abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use logiport_core::CompanyId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Enqueue / claim / acknowledge semantics for background jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError>;

    async fn get(&self, company_id: CompanyId, job_id: JobId) -> Result<Option<Job>, QueueError>;

    /// Persist the outcome of an attempt (completion, scheduled retry).
    async fn update(&self, job: &Job) -> Result<(), QueueError>;

    /// Claim the oldest ready job and mark it running. Claims are exclusive.
    async fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Move a job out of the live queue into the dead-letter list.
    async fn dead_letter(&self, job: Job, reason: String) -> Result<(), QueueError>;

    async fn list_dead_letters(
        &self,
        company_id: CompanyId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, QueueError>;

    /// Re-drive a dead-lettered job: back to pending with a fresh attempt budget.
    async fn redrive(&self, company_id: CompanyId, job_id: JobId) -> Result<Job, QueueError>;

    async fn stats(&self, company_id: CompanyId) -> Result<JobStats, QueueError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("company isolation violation")]
    CompanyIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    offline: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call fail with [`QueueError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), QueueError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("queue is offline".to_string()));
        }
        Ok(())
    }

    fn jobs_read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, QueueError> {
        self.check_online()?;
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, QueueError> {
        self.check_online()?;
        self.jobs.write().map_err(|_| poisoned())
    }

    fn dlq_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<JobId, DeadLetterEntry>>, QueueError> {
        self.dead_letters.read().map_err(|_| poisoned())
    }

    fn dlq_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, QueueError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> QueueError {
    QueueError::Unavailable("queue lock poisoned".to_string())
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let mut jobs = self.jobs_write()?;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, company_id: CompanyId, job_id: JobId) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs_read()?;
        match jobs.get(&job_id) {
            Some(job) if job.company_id == company_id => Ok(Some(job.clone())),
            Some(_) => Err(QueueError::CompanyIsolation),
            None => Ok(None),
        }
    }

    async fn update(&self, job: &Job) -> Result<(), QueueError> {
        let mut jobs = self.jobs_write()?;
        if !jobs.contains_key(&job.id) {
            return Err(QueueError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut jobs = self.jobs_write()?;
        let now = Utc::now();

        // FIFO by creation time
        let next = jobs
            .values()
            .filter(|j| j.is_claimable(now))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            let job = jobs.get_mut(&id)?;
            job.mark_running();
            Some(job.clone())
        }))
    }

    async fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), QueueError> {
        let mut jobs = self.jobs_write()?;
        let mut dls = self.dlq_write()?;

        if !matches!(job.status, JobStatus::DeadLettered { .. }) {
            job.status = JobStatus::DeadLettered {
                error: reason.clone(),
                attempts: job.attempt,
            };
        }
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    async fn list_dead_letters(
        &self,
        company_id: CompanyId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, QueueError> {
        self.check_online()?;
        let dls = self.dlq_read()?;
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.company_id == company_id)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    async fn redrive(&self, company_id: CompanyId, job_id: JobId) -> Result<Job, QueueError> {
        let mut jobs = self.jobs_write()?;
        let mut dls = self.dlq_write()?;

        match dls.get(&job_id) {
            None => return Err(QueueError::NotFound(job_id)),
            Some(entry) if entry.job.company_id != company_id => {
                return Err(QueueError::CompanyIsolation);
            }
            Some(_) => {}
        }
        let entry = dls.remove(&job_id).ok_or(QueueError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        // history is kept so the earlier failures stay visible

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn stats(&self, company_id: CompanyId) -> Result<JobStats, QueueError> {
        let jobs = self.jobs_read()?;
        let dls = self.dlq_read()?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.company_id == company_id) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls
            .values()
            .filter(|e| e.job.company_id == company_id)
            .count();

        Ok(stats)
    }
}
