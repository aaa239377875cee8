//! Async worker pool with retry, backoff and dead-letter handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::{JobQueue, QueueError};
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Executes one kind of job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult;
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Idle sleep between claim attempts
    pub poll_interval: Duration,
    /// Number of concurrent worker tasks
    pub workers: usize,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            workers: 4,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

fn lock_stats(stats: &Mutex<ExecutorStats>) -> MutexGuard<'_, ExecutorStats> {
    stats.lock().unwrap_or_else(|p| p.into_inner())
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
    started: Instant,
}

impl JobExecutorHandle {
    /// Stop claiming new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "job worker task failed");
            }
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        let mut stats = lock_stats(&self.stats).clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Claims jobs from a queue and routes them to registered handlers.
pub struct JobExecutor {
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an exact type name, a `prefix.*` pattern or `*`.
    pub fn register_handler(&mut self, kind_pattern: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind_pattern.into(), handler);
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&Arc<dyn JobHandler>> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h);
        }

        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if type_name.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        self.handlers.get("*")
    }

    /// Spawn `config.workers` tasks on the current runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let executor = Arc::new(self);

        let workers = (0..config.workers.max(1))
            .map(|n| {
                let executor = executor.clone();
                let stats = stats.clone();
                let shutdown = shutdown_rx.clone();
                let name = format!("{}-{n}", config.name);
                let poll = config.poll_interval;
                tokio::spawn(async move { worker_loop(executor, name, poll, shutdown, stats).await })
            })
            .collect();

        info!(executor = %config.name, workers = config.workers, "job executor started");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            workers,
            stats,
            started: Instant::now(),
        }
    }

    /// Claim and run jobs until none is ready. Returns how many ran.
    pub async fn run_until_idle(&self) -> Result<usize, QueueError> {
        let mut ran = 0;
        while let Some(mut job) = self.queue.claim_next().await? {
            let _ = self.execute_one(&mut job).await;
            ran += 1;
        }
        Ok(ran)
    }

    /// Run one claimed job and record its outcome.
    pub async fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let started = Utc::now();

        let Some(handler) = self.get_handler(&job.kind) else {
            let error = format!("no handler for job kind: {}", job.kind.type_name());
            job.mark_fatal(error.clone(), started);
            self.bury(job, &error).await;
            return Err(error);
        };

        match handler.handle(job).await {
            JobResult::Success => {
                job.mark_completed(started);
                self.record(job).await?;
                debug!(job_id = %job.id, kind = job.kind.type_name(), "job completed");
                Ok(())
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    self.bury(job, &error).await;
                } else {
                    warn!(
                        job_id = %job.id,
                        kind = job.kind.type_name(),
                        attempt = job.attempt,
                        error = %error,
                        "job failed; retry scheduled"
                    );
                    self.record(job).await?;
                }
                Err(error)
            }
            JobResult::Fatal(error) => {
                job.mark_fatal(error.clone(), started);
                self.bury(job, &error).await;
                Err(error)
            }
        }
    }

    /// Persist an attempt's outcome. On failure the queue still holds the job
    /// as running, so it comes back once its lease lapses.
    async fn record(&self, job: &Job) -> Result<(), String> {
        self.queue.update(job).await.map_err(|e| {
            error!(
                alert = true,
                job_id = %job.id,
                company_id = %job.company_id,
                kind = job.kind.type_name(),
                attempt = job.attempt,
                lease_secs = job.lease.as_secs(),
                error = %e,
                "failed to record job outcome; job is reclaimed after its lease"
            );
            e.to_string()
        })
    }

    async fn bury(&self, job: &Job, error: &str) {
        error!(
            alert = true,
            job_id = %job.id,
            company_id = %job.company_id,
            kind = job.kind.type_name(),
            attempts = job.attempt,
            error = %error,
            "job dead-lettered; operator attention required"
        );
        if let Err(e) = self.queue.dead_letter(job.clone(), error.to_string()).await {
            error!(
                alert = true,
                job_id = %job.id,
                lease_secs = job.lease.as_secs(),
                error = %e,
                "failed to dead-letter job; job is reclaimed after its lease"
            );
        }
    }
}

async fn worker_loop(
    executor: Arc<JobExecutor>,
    name: String,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    debug!(worker = %name, "job worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match executor.queue.claim_next().await {
            Ok(Some(mut job)) => {
                debug!(worker = %name, job_id = %job.id, kind = job.kind.type_name(), "claimed job");
                lock_stats(&stats).current_running += 1;

                let result = executor.execute_one(&mut job).await;

                let mut s = lock_stats(&stats);
                s.current_running = s.current_running.saturating_sub(1);
                s.jobs_processed += 1;
                match (&result, &job.status) {
                    (Ok(()), _) => s.jobs_succeeded += 1,
                    (Err(_), JobStatus::DeadLettered { .. }) => {
                        s.jobs_failed += 1;
                        s.jobs_dead_lettered += 1;
                    }
                    (Err(_), _) => s.jobs_failed += 1,
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                error!(worker = %name, error = %e, "failed to claim job");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    debug!(worker = %name, "job worker stopped");
}
