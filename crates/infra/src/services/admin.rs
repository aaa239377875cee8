//! Company-admin bulk commands and job operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use logiport_auth::{Capability, Subject};
use logiport_core::{OrderId, UserId};
use logiport_exports::Export;
use logiport_orders::{Decision, OrderStatus};

use crate::features::{Feature, FeatureGate, FeatureToggles};
use crate::jobs::{DeadLetterEntry, Job, JobId, JobQueue, JobStats};
use crate::retry::RetryCoordinator;
use crate::services::{admit, ExportService, ServiceError};
use crate::store::{OrderFilter, StoreError, Stores};
use crate::workers::{OrderProcessor, ProcessError, ProcessOutcome};

/// Failed orders per user at or above which `block_repeat_offenders` blocks.
pub const REPEAT_OFFENDER_THRESHOLD: usize = 3;

/// What a bulk command did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdminReport {
    pub affected: usize,
    pub skipped: usize,
}

impl From<ProcessError> for ServiceError {
    fn from(value: ProcessError) -> Self {
        match value {
            ProcessError::NotClaimed { source, .. } => source.into(),
            stuck @ ProcessError::Stuck { .. } => ServiceError::Transient(stuck.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AdminCommands {
    stores: Stores,
    queue: Arc<dyn JobQueue>,
    gate: FeatureGate,
    processor: Arc<OrderProcessor>,
    exports: ExportService,
    retry: RetryCoordinator,
}

impl AdminCommands {
    pub fn new(
        stores: Stores,
        queue: Arc<dyn JobQueue>,
        gate: FeatureGate,
        processor: Arc<OrderProcessor>,
        exports: ExportService,
        retry: RetryCoordinator,
    ) -> Self {
        Self {
            stores,
            queue,
            gate,
            processor,
            exports,
            retry,
        }
    }

    async fn admit(&self, subject: &Subject) -> Result<(), ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::ManageCompany).await
    }

    pub async fn export_selected(
        &self,
        subject: &Subject,
        order_ids: Vec<OrderId>,
    ) -> Result<Export, ServiceError> {
        self.admit(subject).await?;
        self.exports
            .create(subject, order_ids, Some("admin selection".to_string()))
            .await
    }

    /// Approve pending orders directly, bypassing the approval service.
    /// Stock still has to cover each order.
    pub async fn approve_selected(
        &self,
        subject: &Subject,
        order_ids: &[OrderId],
    ) -> Result<AdminReport, ServiceError> {
        self.admit(subject).await?;
        let mut report = AdminReport::default();
        for &order_id in order_ids {
            let outcome = self
                .processor
                .force_decision(subject.company_id, order_id, Decision::Approved)
                .await?;
            match outcome {
                ProcessOutcome::Resolved(OrderStatus::Approved) => report.affected += 1,
                other => {
                    debug!(order_id = %order_id, outcome = ?other, "order not approved");
                    report.skipped += 1;
                }
            }
        }
        info!(
            company_id = %subject.company_id,
            approved = report.affected,
            skipped = report.skipped,
            "admin approval finished"
        );
        Ok(report)
    }

    /// Retry every selected order that is eligible; the rest are skipped.
    pub async fn retry_failed(
        &self,
        subject: &Subject,
        order_ids: &[OrderId],
    ) -> Result<AdminReport, ServiceError> {
        self.admit(subject).await?;
        let mut report = AdminReport::default();
        for &order_id in order_ids {
            match self.retry.retry(subject, order_id).await {
                Ok(_) => report.affected += 1,
                Err(ServiceError::Conflict(_) | ServiceError::NotFound) => report.skipped += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Block every user of the company with at least `threshold` failed orders.
    pub async fn block_repeat_offenders(
        &self,
        subject: &Subject,
        threshold: usize,
    ) -> Result<Vec<UserId>, ServiceError> {
        self.admit(subject).await?;
        if threshold == 0 {
            return Err(ServiceError::Validation("threshold must be at least 1".to_string()));
        }

        let failed = self
            .stores
            .orders
            .list(subject.company_id, OrderFilter::status(OrderStatus::Failed))
            .await?;
        let mut per_user: BTreeMap<UserId, usize> = BTreeMap::new();
        for user in failed.iter().filter_map(|o| o.requested_by()) {
            *per_user.entry(user).or_default() += 1;
        }

        let mut blocked = Vec::new();
        for (user_id, count) in per_user.into_iter().filter(|(_, n)| *n >= threshold) {
            match self
                .stores
                .directory
                .set_blocked(subject.company_id, user_id, true)
                .await
            {
                Ok(()) => {
                    warn!(user_id = %user_id, failed_orders = count, "user blocked");
                    blocked.push(user_id);
                }
                Err(StoreError::NotFound) => {
                    debug!(user_id = %user_id, "no profile to block");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(blocked)
    }

    pub async fn set_feature(
        &self,
        subject: &Subject,
        feature: Feature,
        enabled: bool,
    ) -> Result<FeatureToggles, ServiceError> {
        self.admit(subject).await?;
        Ok(self.gate.set(subject.company_id, feature, enabled).await?)
    }

    pub async fn features(&self, subject: &Subject) -> Result<FeatureToggles, ServiceError> {
        self.admit(subject).await?;
        Ok(self.gate.toggles(subject.company_id).await?)
    }

    /// Queue processing for every pending order of the company. Processing
    /// skips anything no longer pending, so duplicates are harmless.
    pub async fn requeue_pending(&self, subject: &Subject) -> Result<usize, ServiceError> {
        self.admit(subject).await?;
        let pending = self
            .stores
            .orders
            .list(subject.company_id, OrderFilter::status(OrderStatus::Pending))
            .await?;
        for order in &pending {
            self.queue
                .enqueue(Job::process_order(subject.company_id, order.id_typed()))
                .await?;
        }
        info!(company_id = %subject.company_id, requeued = pending.len(), "pending orders requeued");
        Ok(pending.len())
    }

    pub async fn dead_letters(
        &self,
        subject: &Subject,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, ServiceError> {
        self.admit(subject).await?;
        Ok(self.queue.list_dead_letters(subject.company_id, limit).await?)
    }

    pub async fn redrive(&self, subject: &Subject, job_id: JobId) -> Result<Job, ServiceError> {
        self.admit(subject).await?;
        let job = self.queue.redrive(subject.company_id, job_id).await?;
        info!(job_id = %job_id, job_type = job.kind.type_name(), "dead-lettered job re-driven");
        Ok(job)
    }

    pub async fn job_stats(&self, subject: &Subject) -> Result<JobStats, ServiceError> {
        self.admit(subject).await?;
        Ok(self.queue.stats(subject.company_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use logiport_auth::Role;
    use logiport_core::{Aggregate, Clock, CompanyId, ManualClock, ProductId};
    use logiport_orders::{
        generate_reference_code, BeginProcessing, FixedApproval, LatencyRange, Order,
        OrderCommand, PlaceOrder, ProductRef, RecordDecision,
    };
    use logiport_products::Product;

    use crate::artifacts::InMemoryArtifactStore;
    use crate::jobs::InMemoryJobQueue;
    use crate::store::{InMemoryStore, UserProfile};

    struct Fixture {
        stores: Stores,
        queue: Arc<InMemoryJobQueue>,
        admin: AdminCommands,
        boss: Subject,
        product: Product,
    }

    async fn fixture() -> Fixture {
        let stores = Stores::from_memory(Arc::new(InMemoryStore::new()));
        let queue = InMemoryJobQueue::arc();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let gate = FeatureGate::new(stores.toggles.clone());
        let processor = Arc::new(OrderProcessor::new(
            stores.orders.clone(),
            stores.products.clone(),
            Arc::new(FixedApproval(false)),
            Arc::new(LatencyRange::none()),
            clock.clone(),
        ));
        let exports = ExportService::new(
            stores.clone(),
            queue.clone(),
            gate.clone(),
            Arc::new(InMemoryArtifactStore::new()),
            clock.clone(),
        );
        let retry = RetryCoordinator::new(stores.clone(), queue.clone(), clock);
        let admin = AdminCommands::new(stores.clone(), queue.clone(), gate, processor, exports, retry);

        let company = CompanyId::new();
        let boss = Subject::new(UserId::new(), company, Role::Admin);
        let product = Product::new(ProductId::new(), company, "SKU-A", "Anvil", 5, Utc::now()).unwrap();
        stores.products.insert(&product).await.unwrap();
        Fixture {
            stores,
            queue,
            admin,
            boss,
            product,
        }
    }

    async fn order(fx: &Fixture, by: UserId, quantity: u32, failed: bool) -> OrderId {
        let (mut order, _) = Order::place(PlaceOrder {
            company_id: fx.boss.company_id,
            order_id: OrderId::new(),
            requested_by: by,
            product: ProductRef::from(&fx.product),
            quantity,
            reference_code: generate_reference_code(),
            occurred_at: Utc::now(),
        })
        .unwrap();
        if failed {
            order
                .execute(&OrderCommand::BeginProcessing(BeginProcessing { occurred_at: Utc::now() }))
                .unwrap();
            order
                .execute(&OrderCommand::RecordDecision(RecordDecision {
                    decision: Decision::Rejected,
                    available_stock: 5,
                    occurred_at: Utc::now(),
                }))
                .unwrap();
        }
        fx.stores.orders.insert(&order).await.unwrap();
        order.id_typed()
    }

    async fn status_of(fx: &Fixture, id: OrderId) -> OrderStatus {
        fx.stores
            .orders
            .get(fx.boss.company_id, id)
            .await
            .unwrap()
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn operators_cannot_run_admin_commands() {
        let fx = fixture().await;
        let operator = Subject::new(UserId::new(), fx.boss.company_id, Role::Operator);
        assert!(matches!(
            fx.admin.requeue_pending(&operator).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            fx.admin.set_feature(&operator, Feature::Exports, false).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn approve_selected_deducts_stock_and_skips_the_rest() {
        let fx = fixture().await;
        let user = UserId::new();
        let fits = order(&fx, user, 3, false).await;
        let too_big = order(&fx, user, 3, false).await;
        let already_failed = order(&fx, user, 1, true).await;

        let report = fx
            .admin
            .approve_selected(&fx.boss, &[fits, too_big, already_failed])
            .await
            .unwrap();
        assert_eq!(report, AdminReport { affected: 1, skipped: 2 });
        assert_eq!(status_of(&fx, fits).await, OrderStatus::Approved);
        assert_eq!(status_of(&fx, too_big).await, OrderStatus::Failed);

        let product = fx
            .stores
            .products
            .get(fx.boss.company_id, fx.product.id_typed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.stock_quantity(), 2);
    }

    #[tokio::test]
    async fn retry_failed_skips_ineligible_orders() {
        let fx = fixture().await;
        let user = UserId::new();
        let failed = order(&fx, user, 1, true).await;
        let pending = order(&fx, user, 1, false).await;

        let report = fx.admin.retry_failed(&fx.boss, &[failed, pending]).await.unwrap();
        assert_eq!(report, AdminReport { affected: 1, skipped: 1 });
        assert_eq!(status_of(&fx, failed).await, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn repeat_offenders_are_blocked() {
        let fx = fixture().await;
        let offender = UserId::new();
        let careful = UserId::new();
        for user in [offender, careful] {
            fx.stores
                .directory
                .upsert_profile(&UserProfile {
                    user_id: user,
                    company_id: fx.boss.company_id,
                    username: user.to_string(),
                    role: Role::Operator,
                    is_blocked: false,
                })
                .await
                .unwrap();
        }
        for _ in 0..REPEAT_OFFENDER_THRESHOLD {
            order(&fx, offender, 1, true).await;
        }
        order(&fx, careful, 1, true).await;

        let blocked = fx
            .admin
            .block_repeat_offenders(&fx.boss, REPEAT_OFFENDER_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(blocked, vec![offender]);

        let profile = fx
            .stores
            .directory
            .profile(fx.boss.company_id, offender)
            .await
            .unwrap()
            .unwrap();
        assert!(profile.is_blocked);
    }

    #[tokio::test]
    async fn requeue_pending_queues_every_pending_order() {
        let fx = fixture().await;
        let user = UserId::new();
        order(&fx, user, 1, false).await;
        order(&fx, user, 1, false).await;
        order(&fx, user, 1, true).await;

        assert_eq!(fx.admin.requeue_pending(&fx.boss).await.unwrap(), 2);
        assert_eq!(fx.queue.stats(fx.boss.company_id).await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn feature_toggle_round_trip() {
        let fx = fixture().await;
        let toggles = fx
            .admin
            .set_feature(&fx.boss, Feature::CsvUpload, false)
            .await
            .unwrap();
        assert!(!toggles.is_enabled(Feature::CsvUpload));
        assert!(toggles.is_enabled(Feature::Exports));
    }

    #[tokio::test]
    async fn export_selected_creates_pending_export() {
        let fx = fixture().await;
        let id = order(&fx, UserId::new(), 1, false).await;
        let export = fx.admin.export_selected(&fx.boss, vec![id]).await.unwrap();
        assert_eq!(export.order_ids(), &[id]);
        assert_eq!(fx.admin.job_stats(&fx.boss).await.unwrap().pending, 1);
    }
}
