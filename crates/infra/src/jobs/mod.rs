//! Background job system with retry, backoff and dead-letter handling.
//!
//! - Jobs are company-scoped and typed (`orders.process`, `exports.generate`)
//! - Retry policy with fixed, linear or exponential backoff
//! - Dead-letter list for jobs that exhausted retries or failed fatally,
//!   with manual re-drive
//! - A pool of async workers with graceful shutdown

pub mod backoff;
pub mod executor;
pub mod queue;
pub mod types;

pub use backoff::with_backoff;
pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use queue::{InMemoryJobQueue, JobQueue, JobStats, QueueError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus,
    RetryPolicy, DEFAULT_CLAIM_LEASE, LEASE_EXPIRED,
};
