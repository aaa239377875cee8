//! Wiring: adapters in, services and workers out.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use logiport_core::{Clock, DomainError, SystemClock};
use logiport_orders::{ApprovalSource, LatencyRange, RandomApproval};

use crate::artifacts::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use crate::config::{AppConfig, ConfigError};
use crate::features::FeatureGate;
use crate::jobs::{InMemoryJobQueue, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobKind, JobQueue};
use crate::ratelimit::{BucketStore, InMemoryBucketStore, LimiterStoreError, TokenBucketLimiter};
use crate::retry::RetryCoordinator;
use crate::services::{AdminCommands, ExportService, OrderService};
use crate::store::{InMemoryStore, Stores};
use crate::workers::{ExportGenerator, OrderProcessor, ProcessingConfig};

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("rate limiter store: {0}")]
    Limiter(#[from] LimiterStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// The swappable adapters a [`Backend`] is assembled from.
#[derive(Clone)]
pub struct Components {
    pub stores: Stores,
    pub queue: Arc<dyn JobQueue>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub buckets: Arc<dyn BucketStore>,
    pub approval: Arc<dyn ApprovalSource>,
    pub latency: Arc<LatencyRange>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// Everything in process memory; the caller picks the decision source.
    pub fn in_memory(approval: Arc<dyn ApprovalSource>, latency: LatencyRange) -> Self {
        Self {
            stores: Stores::from_memory(Arc::new(InMemoryStore::new())),
            queue: InMemoryJobQueue::arc(),
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            buckets: Arc::new(InMemoryBucketStore::new()),
            approval,
            latency: Arc::new(latency),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Clone)]
pub struct Backend {
    pub orders: OrderService,
    pub exports: ExportService,
    pub admin: AdminCommands,
    pub gate: FeatureGate,
    pub limiter: TokenBucketLimiter,
    pub stores: Stores,
    queue: Arc<dyn JobQueue>,
    processor: Arc<OrderProcessor>,
    generator: Arc<ExportGenerator>,
}

impl Backend {
    pub fn assemble(components: Components, config: &AppConfig) -> Self {
        let Components {
            stores,
            queue,
            artifacts,
            buckets,
            approval,
            latency,
            clock,
        } = components;

        let gate = FeatureGate::new(stores.toggles.clone());
        let limiter = TokenBucketLimiter::new(buckets, config.rate_limits.clone(), clock.clone())
            .with_fail_mode(config.fail_mode);
        let processor = Arc::new(
            OrderProcessor::new(
                stores.orders.clone(),
                stores.products.clone(),
                approval,
                latency,
                clock.clone(),
            )
            .with_config(ProcessingConfig {
                max_processing: config.max_processing(),
                ..ProcessingConfig::default()
            }),
        );
        let generator = Arc::new(ExportGenerator::new(
            stores.clone(),
            artifacts.clone(),
            clock.clone(),
        ));

        let orders = OrderService::new(stores.clone(), queue.clone(), gate.clone(), clock.clone());
        let exports = ExportService::new(
            stores.clone(),
            queue.clone(),
            gate.clone(),
            artifacts,
            clock.clone(),
        );
        let retry = RetryCoordinator::new(stores.clone(), queue.clone(), clock);
        let admin = AdminCommands::new(
            stores.clone(),
            queue.clone(),
            gate.clone(),
            processor.clone(),
            exports.clone(),
            retry,
        );

        Self {
            orders,
            exports,
            admin,
            gate,
            limiter,
            stores,
            queue,
            processor,
            generator,
        }
    }

    /// Production wiring: random approvals, artifacts on disk, buckets in
    /// Redis when configured.
    pub async fn from_config(config: &AppConfig) -> Result<Self, BootError> {
        config.validate()?;
        let approval: Arc<dyn ApprovalSource> =
            Arc::new(RandomApproval::new(config.approval_probability)?);
        let mut components =
            Components::in_memory(approval, LatencyRange::standard(config.latency_unit()));
        components.artifacts = Arc::new(FsArtifactStore::new(config.artifact_dir.clone()));
        components.buckets = bucket_store(config).await?;
        Ok(Self::assemble(components, config))
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// An executor with both job kinds routed, for callers that drive it
    /// themselves (tests, one-shot tooling).
    pub fn executor(&self) -> JobExecutor {
        let mut executor = JobExecutor::new(self.queue.clone());
        executor.register_handler(JobKind::PROCESS_ORDER, self.processor.clone());
        executor.register_handler(JobKind::GENERATE_EXPORT, self.generator.clone());
        executor
    }

    pub fn start_workers(&self, config: &AppConfig) -> JobExecutorHandle {
        info!(workers = config.workers, "starting job workers");
        self.executor().spawn(
            JobExecutorConfig::default()
                .with_name("logiport-workers")
                .with_workers(config.workers)
                .with_poll_interval(config.poll_interval()),
        )
    }
}

#[cfg(feature = "redis")]
async fn bucket_store(config: &AppConfig) -> Result<Arc<dyn BucketStore>, BootError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let store = crate::ratelimit::RedisBucketStore::connect(url).await?;
            info!("rate limit buckets stored in redis");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryBucketStore::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn bucket_store(config: &AppConfig) -> Result<Arc<dyn BucketStore>, BootError> {
    if config.redis_url.is_some() {
        tracing::warn!("LOGIPORT_REDIS_URL set but built without the redis feature; using process memory");
    }
    Ok(Arc::new(InMemoryBucketStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logiport_orders::FixedApproval;

    #[tokio::test]
    async fn assembled_executor_routes_both_job_kinds() {
        let backend = Backend::assemble(
            Components::in_memory(Arc::new(FixedApproval(true)), LatencyRange::none()),
            &AppConfig::default(),
        );
        // Nothing queued yet.
        assert_eq!(backend.executor().run_until_idle().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_probability_fails_boot() {
        let config = AppConfig {
            approval_probability: 2.0,
            ..AppConfig::default()
        };
        assert!(matches!(
            Backend::from_config(&config).await,
            Err(BootError::Config(_))
        ));
    }
}
