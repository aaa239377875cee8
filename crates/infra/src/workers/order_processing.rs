//! Order processing: claim a pending order, wait on the (simulated) external
//! approval call, then record the decision together with the stock change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use logiport_core::{Aggregate, AggregateRoot, Clock, CompanyId, ExpectedVersion, OrderId};
use logiport_orders::{
    ApprovalSource, BeginProcessing, Decision, LatencyRange, Order, OrderCommand, OrderStatus,
    RecordDecision,
};

use crate::jobs::{with_backoff, Job, JobHandler, JobKind, JobResult, RetryPolicy};
use crate::store::{OrderStore, ProductStore, StoreError};
use crate::transitions::log_events;

/// Stock races are re-decided against fresh stock at most this many times.
const MAX_STOCK_ROUNDS: usize = 5;

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Upper bound for the external call; beyond it the order fails as timed out.
    pub max_processing: Duration,
    /// Backoff for persisting the decision while the store is unavailable.
    pub commit_policy: RetryPolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processing: Duration::from_secs(30),
            commit_policy: RetryPolicy::exponential(
                5,
                Duration::from_millis(200),
                Duration::from_secs(5),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Reached a decision; the status is `approved` or `failed`.
    Resolved(OrderStatus),
    /// Nothing to do: missing, not pending, or claimed by someone else.
    Skipped { status: Option<OrderStatus> },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Nothing was changed; the order is still pending and the job may retry.
    #[error("order {order_id} not claimed: {source}")]
    NotClaimed {
        order_id: OrderId,
        #[source]
        source: StoreError,
    },

    /// The order is left in `processing` and needs manual intervention.
    #[error("order {order_id} left in processing: {reason}")]
    Stuck { order_id: OrderId, reason: String },
}

enum Claim {
    Claimed(Order),
    Skip(Option<OrderStatus>),
}

pub struct OrderProcessor {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStore>,
    approval: Arc<dyn ApprovalSource>,
    latency: Arc<LatencyRange>,
    clock: Arc<dyn Clock>,
    config: ProcessingConfig,
}

impl OrderProcessor {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStore>,
        approval: Arc<dyn ApprovalSource>,
        latency: Arc<LatencyRange>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            products,
            approval,
            latency,
            clock,
            config: ProcessingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessingConfig) -> Self {
        self.config = config;
        self
    }

    /// Process one order. A no-op unless the order is pending, so duplicate
    /// enqueues are harmless.
    pub async fn process(
        &self,
        company_id: CompanyId,
        order_id: OrderId,
    ) -> Result<ProcessOutcome, ProcessError> {
        let claimed = match self.claim(company_id, order_id).await? {
            Claim::Claimed(order) => order,
            Claim::Skip(status) => return Ok(ProcessOutcome::Skipped { status }),
        };
        let decision = self.external_decision(order_id).await;
        self.resolve(claimed, decision).await
    }

    /// Drive a pending order straight to `decision`, skipping the external call.
    pub async fn force_decision(
        &self,
        company_id: CompanyId,
        order_id: OrderId,
        decision: Decision,
    ) -> Result<ProcessOutcome, ProcessError> {
        match self.claim(company_id, order_id).await? {
            Claim::Claimed(order) => self.resolve(order, decision).await,
            Claim::Skip(status) => Ok(ProcessOutcome::Skipped { status }),
        }
    }

    /// `pending -> processing` under a conditional update.
    async fn claim(&self, company_id: CompanyId, order_id: OrderId) -> Result<Claim, ProcessError> {
        let not_claimed = |source| ProcessError::NotClaimed { order_id, source };

        let Some(order) = self
            .orders
            .get(company_id, order_id)
            .await
            .map_err(not_claimed)?
        else {
            warn!(order_id = %order_id, company_id = %company_id, "order to process not found");
            return Ok(Claim::Skip(None));
        };

        if order.status() != OrderStatus::Pending {
            debug!(order_id = %order_id, status = %order.status(), "order not pending; skipping");
            return Ok(Claim::Skip(Some(order.status())));
        }

        let mut next = order.clone();
        let events = match next.execute(&OrderCommand::BeginProcessing(BeginProcessing {
            occurred_at: self.clock.now(),
        })) {
            Ok(events) => events,
            Err(e) => {
                debug!(order_id = %order_id, error = %e, "order cannot begin processing");
                return Ok(Claim::Skip(Some(order.status())));
            }
        };

        match self
            .orders
            .commit(&next, ExpectedVersion::Exact(order.version()), None)
            .await
        {
            Ok(()) => {
                log_events(&events);
                Ok(Claim::Claimed(next))
            }
            Err(StoreError::Conflict(_)) | Err(StoreError::NotFound) => {
                debug!(order_id = %order_id, "order claimed concurrently; skipping");
                Ok(Claim::Skip(None))
            }
            Err(e) => Err(not_claimed(e)),
        }
    }

    /// The simulated approval call: a suspending delay, then a draw.
    async fn external_decision(&self, order_id: OrderId) -> Decision {
        let latency = self.latency.sample();
        let call = async {
            tokio::time::sleep(latency).await;
            self.approval.approve()
        };

        match tokio::time::timeout(self.config.max_processing, call).await {
            Ok(true) => Decision::Approved,
            Ok(false) => Decision::Rejected,
            Err(_) => {
                warn!(
                    order_id = %order_id,
                    max_processing_ms = self.config.max_processing.as_millis() as u64,
                    "approval call exceeded processing bound"
                );
                Decision::TimedOut
            }
        }
    }

    async fn resolve(&self, order: Order, decision: Decision) -> Result<ProcessOutcome, ProcessError> {
        let this = self;
        let claimed = &order;
        let result = with_backoff(
            &self.config.commit_policy,
            StoreError::is_transient,
            move || this.try_resolve(claimed, decision),
        )
        .await;

        match result {
            Ok(Some(status)) => Ok(ProcessOutcome::Resolved(status)),
            Ok(None) => {
                warn!(order_id = %order.id_typed(), "processing order changed concurrently");
                Ok(ProcessOutcome::Skipped { status: None })
            }
            Err(e) => {
                error!(
                    alert = true,
                    order_id = %order.id_typed(),
                    company_id = ?order.company_id(),
                    decision = ?decision,
                    error = %e,
                    "order left in processing; manual intervention required"
                );
                Err(ProcessError::Stuck {
                    order_id: order.id_typed(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// One attempt at persisting the decision. `Ok(None)` on a lost race.
    async fn try_resolve(
        &self,
        order: &Order,
        decision: Decision,
    ) -> Result<Option<OrderStatus>, StoreError> {
        let company_id = order
            .company_id()
            .ok_or_else(|| StoreError::Conflict("order has not been placed".to_string()))?;
        let product_id = order
            .product_id()
            .ok_or_else(|| StoreError::Conflict("order has no product".to_string()))?;

        for _ in 0..MAX_STOCK_ROUNDS {
            let available_stock = self
                .products
                .get(company_id, product_id)
                .await?
                .map(|p| p.stock_quantity())
                .unwrap_or(0);

            let mut next = order.clone();
            let events = next
                .execute(&OrderCommand::RecordDecision(RecordDecision {
                    decision,
                    available_stock,
                    occurred_at: self.clock.now(),
                }))
                .map_err(|e| StoreError::Conflict(e.to_string()))?;
            let deduction = events.iter().find_map(|e| e.stock_deduction());

            match self
                .orders
                .commit(&next, ExpectedVersion::Exact(order.version()), deduction)
                .await
            {
                Ok(()) => {
                    log_events(&events);
                    return Ok(Some(next.status()));
                }
                // Stock moved since the read: decide again on the fresh value.
                Err(StoreError::InsufficientStock { available }) => {
                    debug!(order_id = %order.id_typed(), available, "stock changed; re-deciding");
                }
                Err(StoreError::Conflict(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Conflict(
            "stock kept changing while recording the decision".to_string(),
        ))
    }
}

#[async_trait]
impl JobHandler for OrderProcessor {
    async fn handle(&self, job: &Job) -> JobResult {
        let JobKind::ProcessOrder { order_id } = &job.kind else {
            return JobResult::Fatal(format!("unexpected job kind: {}", job.kind.type_name()));
        };

        match self.process(job.company_id, *order_id).await {
            Ok(_) => JobResult::Success,
            Err(e @ ProcessError::NotClaimed { .. }) => JobResult::Failure(e.to_string()),
            Err(e @ ProcessError::Stuck { .. }) => JobResult::Fatal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::InMemoryStore;
    use logiport_core::{ManualClock, ProductId, UserId};
    use logiport_orders::{
        generate_reference_code, FailureReason, FixedApproval, PlaceOrder, ProductRef,
        ScriptedApproval,
    };
    use logiport_products::Product;

    struct Fixture {
        store: Arc<InMemoryStore>,
        product: Product,
    }

    impl Fixture {
        async fn new(stock: u32) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let product = Product::new(
                ProductId::new(),
                logiport_core::CompanyId::new(),
                "SKU-1",
                "Bolt",
                stock,
                Utc::now(),
            )
            .unwrap();
            ProductStore::insert(store.as_ref(), &product).await.unwrap();
            Self { store, product }
        }

        async fn order(&self, quantity: u32) -> Order {
            use logiport_core::Entity;
            let (order, _) = Order::place(PlaceOrder {
                company_id: self.product.company_id(),
                order_id: OrderId::new(),
                requested_by: UserId::new(),
                product: ProductRef::from(&self.product),
                quantity,
                reference_code: generate_reference_code(),
                occurred_at: Utc::now(),
            })
            .unwrap();
            OrderStore::insert(self.store.as_ref(), &order).await.unwrap();
            order
        }

        fn processor(&self, approval: Arc<dyn ApprovalSource>) -> OrderProcessor {
            OrderProcessor::new(
                self.store.clone(),
                self.store.clone(),
                approval,
                Arc::new(LatencyRange::none()),
                Arc::new(ManualClock::starting_now()),
            )
            .with_config(ProcessingConfig {
                max_processing: Duration::from_secs(5),
                commit_policy: RetryPolicy::fixed(3, Duration::from_millis(1)),
            })
        }

        async fn stock(&self) -> u32 {
            use logiport_core::Entity;
            ProductStore::get(self.store.as_ref(), self.product.company_id(), self.product.id_typed())
                .await
                .unwrap()
                .unwrap()
                .stock_quantity()
        }

        async fn reload(&self, order: &Order) -> Order {
            OrderStore::get(self.store.as_ref(), order.company_id().unwrap(), order.id_typed())
                .await
                .unwrap()
                .unwrap()
        }
    }

    #[tokio::test]
    async fn approval_deducts_stock_once() {
        let fx = Fixture::new(10).await;
        let order = fx.order(4).await;
        let processor = fx.processor(Arc::new(FixedApproval(true)));

        let outcome = processor
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Resolved(OrderStatus::Approved));
        assert_eq!(fx.stock().await, 6);

        // duplicate enqueue is a no-op
        let again = processor
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap();
        assert_eq!(
            again,
            ProcessOutcome::Skipped {
                status: Some(OrderStatus::Approved)
            }
        );
        assert_eq!(fx.stock().await, 6);
        assert!(fx.reload(&order).await.has_been_processed());
    }

    #[tokio::test]
    async fn insufficient_stock_fails_regardless_of_draw() {
        let fx = Fixture::new(3).await;
        for approve in [true, false] {
            let order = fx.order(5).await;
            fx.processor(Arc::new(FixedApproval(approve)))
                .process(order.company_id().unwrap(), order.id_typed())
                .await
                .unwrap();
            let stored = fx.reload(&order).await;
            assert_eq!(stored.status(), OrderStatus::Failed);
            if approve {
                assert_eq!(stored.failure_reason(), Some(FailureReason::InsufficientStock));
            }
        }
        assert_eq!(fx.stock().await, 3);
    }

    #[tokio::test]
    async fn rejection_leaves_stock_alone() {
        let fx = Fixture::new(3).await;
        let order = fx.order(1).await;
        fx.processor(Arc::new(FixedApproval(false)))
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap();

        let stored = fx.reload(&order).await;
        assert_eq!(stored.failure_reason(), Some(FailureReason::Rejected));
        assert!(stored.has_been_processed());
        assert_eq!(fx.stock().await, 3);
    }

    #[tokio::test]
    async fn slow_approval_times_out_as_failure() {
        let fx = Fixture::new(3).await;
        let order = fx.order(1).await;
        let processor = OrderProcessor::new(
            fx.store.clone(),
            fx.store.clone(),
            Arc::new(FixedApproval(true)),
            Arc::new(LatencyRange::standard(Duration::from_millis(200))),
            Arc::new(ManualClock::starting_now()),
        )
        .with_config(ProcessingConfig {
            max_processing: Duration::from_millis(20),
            ..ProcessingConfig::default()
        });

        processor
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap();
        let stored = fx.reload(&order).await;
        assert_eq!(stored.failure_reason(), Some(FailureReason::TimedOut));
        assert_eq!(fx.stock().await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_process_an_order_once() {
        let fx = Fixture::new(10).await;
        let order = fx.order(3).await;
        let processor = Arc::new(fx.processor(Arc::new(FixedApproval(true))));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let processor = processor.clone();
            let (company, id) = (order.company_id().unwrap(), order.id_typed());
            handles.push(tokio::spawn(async move { processor.process(company, id).await }));
        }
        let resolved = {
            let mut n = 0;
            for h in handles {
                if let ProcessOutcome::Resolved(_) = h.await.unwrap().unwrap() {
                    n += 1;
                }
            }
            n
        };

        assert_eq!(resolved, 1);
        assert_eq!(fx.stock().await, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_respect_stock() {
        let fx = Fixture::new(5).await;
        let processor = Arc::new(fx.processor(Arc::new(FixedApproval(true))));

        let mut orders = Vec::new();
        for _ in 0..4 {
            orders.push(fx.order(2).await);
        }
        let handles: Vec<_> = orders
            .iter()
            .map(|o| {
                let processor = processor.clone();
                let (company, id) = (o.company_id().unwrap(), o.id_typed());
                tokio::spawn(async move { processor.process(company, id).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut approved = 0;
        for o in &orders {
            if fx.reload(o).await.status() == OrderStatus::Approved {
                approved += 1;
            }
        }
        assert_eq!(approved, 2);
        assert_eq!(fx.stock().await, 1);
    }

    #[tokio::test]
    async fn store_outage_before_claim_is_retriable() {
        let fx = Fixture::new(5).await;
        let order = fx.order(1).await;
        fx.store.set_offline(true);

        let err = fx
            .processor(Arc::new(FixedApproval(true)))
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotClaimed { .. }));

        fx.store.set_offline(false);
        assert_eq!(fx.reload(&order).await.status(), OrderStatus::Pending);
    }

    /// Goes offline on its first draw, after the claim has been committed.
    struct OutageOnDraw(Arc<InMemoryStore>);

    impl ApprovalSource for OutageOnDraw {
        fn approve(&self) -> bool {
            self.0.set_offline(true);
            true
        }
    }

    #[tokio::test]
    async fn store_outage_after_claim_leaves_order_processing() {
        let fx = Fixture::new(5).await;
        let order = fx.order(1).await;

        let err = fx
            .processor(Arc::new(OutageOnDraw(fx.store.clone())))
            .process(order.company_id().unwrap(), order.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Stuck { .. }));

        fx.store.set_offline(false);
        let stored = fx.reload(&order).await;
        assert_eq!(stored.status(), OrderStatus::Processing);
        assert_eq!(fx.stock().await, 5);
    }

    #[tokio::test]
    async fn forced_approval_still_checks_stock() {
        let fx = Fixture::new(2).await;
        let order = fx.order(3).await;
        let processor = fx.processor(Arc::new(ScriptedApproval::new([])));

        let outcome = processor
            .force_decision(order.company_id().unwrap(), order.id_typed(), Decision::Approved)
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Resolved(OrderStatus::Failed));
        assert_eq!(fx.stock().await, 2);
    }

    #[tokio::test]
    async fn handler_maps_outcomes_to_job_results() {
        let fx = Fixture::new(5).await;
        let order = fx.order(1).await;
        let processor = fx.processor(Arc::new(FixedApproval(true)));

        let job = Job::process_order(order.company_id().unwrap(), order.id_typed());
        assert_eq!(processor.handle(&job).await, JobResult::Success);

        fx.store.set_offline(true);
        let job = Job::process_order(order.company_id().unwrap(), order.id_typed());
        assert!(matches!(processor.handle(&job).await, JobResult::Failure(_)));
    }
}
