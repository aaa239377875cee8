//! Order intake, listing and retry.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use logiport_auth::{Capability, Subject};
use logiport_core::{Clock, OrderId, ProductId};
use logiport_orders::{generate_reference_code, Order, OrderEvent, PlaceOrder, ProductRef};
use logiport_products::Product;

use crate::features::{Feature, FeatureGate};
use crate::jobs::{Job, JobQueue};
use crate::retry::RetryCoordinator;
use crate::services::{admit, require_feature, visible_to, ServiceError};
use crate::store::{OrderFilter, StoreError, Stores};
use crate::transitions::log_events;

/// Upper bound on lines accepted by one bulk submission.
pub const MAX_BULK_LINES: usize = 500;

/// Fresh reference codes tried per order before giving up.
const REFERENCE_ATTEMPTS: usize = 5;

type ReferenceGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NewOrder {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct OrderService {
    stores: Stores,
    queue: Arc<dyn JobQueue>,
    gate: FeatureGate,
    retry: RetryCoordinator,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
}

impl OrderService {
    pub fn new(
        stores: Stores,
        queue: Arc<dyn JobQueue>,
        gate: FeatureGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry = RetryCoordinator::new(stores.clone(), queue.clone(), clock.clone());
        Self {
            stores,
            queue,
            gate,
            retry,
            clock,
            references: Arc::new(generate_reference_code),
        }
    }

    /// Replace the `ORD-XXXXXXXX` generator.
    pub fn with_reference_generator(
        mut self,
        generate: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.references = Arc::new(generate);
        self
    }

    /// Place one order and queue it for processing.
    pub async fn create(&self, subject: &Subject, line: NewOrder) -> Result<Order, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::PlaceOrders).await?;
        let placed = self.build(subject, line).await?;
        let mut created = self.persist(subject, vec![placed]).await?;
        created.pop().ok_or_else(|| ServiceError::Invariant("no order created".to_string()))
    }

    /// All-or-nothing validation, then one order per line.
    pub async fn bulk_create(
        &self,
        subject: &Subject,
        lines: &[NewOrder],
    ) -> Result<Vec<Order>, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::PlaceOrders).await?;
        require_feature(&self.gate, subject, Feature::BulkOrders).await?;
        if lines.is_empty() {
            return Err(ServiceError::Validation("no order lines given".to_string()));
        }
        if lines.len() > MAX_BULK_LINES {
            return Err(ServiceError::Validation(format!(
                "at most {MAX_BULK_LINES} lines per bulk submission"
            )));
        }

        let mut placed = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let order = self.build(subject, *line).await.map_err(|e| match e {
                ServiceError::Validation(msg) => {
                    ServiceError::Validation(format!("line {}: {msg}", index + 1))
                }
                other => other,
            })?;
            placed.push(order);
        }
        self.persist(subject, placed).await
    }

    pub async fn get(&self, subject: &Subject, order_id: OrderId) -> Result<Order, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::ReadCatalog).await?;
        self.stores
            .orders
            .get(subject.company_id, order_id)
            .await?
            .filter(|order| visible_to(subject, order))
            .ok_or(ServiceError::NotFound)
    }

    pub async fn list(&self, subject: &Subject, filter: OrderFilter) -> Result<Vec<Order>, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::ReadCatalog).await?;
        let filter = if subject.is_admin() {
            filter
        } else {
            OrderFilter {
                requested_by: Some(subject.user_id),
                ..filter
            }
        };
        Ok(self.stores.orders.list(subject.company_id, filter).await?)
    }

    /// Active products the caller may order.
    pub async fn catalog(&self, subject: &Subject) -> Result<Vec<Product>, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::ReadCatalog).await?;
        let mut products = self.stores.products.list(subject.company_id).await?;
        products.retain(Product::can_be_ordered);
        Ok(products)
    }

    pub async fn retry(&self, subject: &Subject, order_id: OrderId) -> Result<Order, ServiceError> {
        self.retry.retry(subject, order_id).await
    }

    pub fn retry_coordinator(&self) -> &RetryCoordinator {
        &self.retry
    }

    /// Validate one line; the returned command places cleanly.
    async fn build(&self, subject: &Subject, line: NewOrder) -> Result<PlaceOrder, ServiceError> {
        let product = self
            .stores
            .products
            .get(subject.company_id, line.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::Validation("product does not belong to your company".to_string())
            })?;

        let cmd = PlaceOrder {
            company_id: subject.company_id,
            order_id: OrderId::new(),
            requested_by: subject.user_id,
            product: ProductRef::from(&product),
            quantity: line.quantity,
            reference_code: (self.references)(),
            occurred_at: self.clock.now(),
        };
        Order::place(cmd.clone())?;
        Ok(cmd)
    }

    /// Insert under a unique reference code, drawing a new one on collision.
    async fn insert_unique(&self, mut cmd: PlaceOrder) -> Result<(Order, OrderEvent), ServiceError> {
        for _ in 0..REFERENCE_ATTEMPTS {
            let (order, event) = Order::place(cmd.clone())?;
            match self.stores.orders.insert(&order).await {
                Ok(()) => return Ok((order, event)),
                Err(StoreError::DuplicateReference(code)) => {
                    warn!(order_id = %cmd.order_id, reference_code = %code, "reference code taken; drawing another");
                    cmd.reference_code = (self.references)();
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Transient(
            "could not allocate a unique reference code".to_string(),
        ))
    }

    async fn persist(
        &self,
        subject: &Subject,
        placed: Vec<PlaceOrder>,
    ) -> Result<Vec<Order>, ServiceError> {
        let mut orders = Vec::with_capacity(placed.len());
        for cmd in placed {
            let (order, event) = self.insert_unique(cmd).await?;
            log_events(std::slice::from_ref(&event));
            orders.push(order);
        }

        for order in &orders {
            if let Err(e) = self
                .queue
                .enqueue(Job::process_order(subject.company_id, order.id_typed()))
                .await
            {
                error!(
                    alert = true,
                    order_id = %order.id_typed(),
                    error = %e,
                    "order saved as pending but not queued; requeue_pending re-drives it"
                );
                return Err(ServiceError::Transient(format!(
                    "order {} is pending but could not be queued: {e}",
                    order.reference_code()
                )));
            }
        }

        info!(
            company_id = %subject.company_id,
            requested_by = %subject.user_id,
            count = orders.len(),
            "orders placed"
        );
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use logiport_auth::Role;
    use logiport_core::{CompanyId, ManualClock, UserId};
    use logiport_orders::OrderStatus;

    use crate::jobs::InMemoryJobQueue;
    use crate::store::memory::InMemoryStore;
    use crate::store::{ProductStore, UserProfile};
    use crate::store::DirectoryStore;

    struct Fixture {
        memory: Arc<InMemoryStore>,
        queue: Arc<InMemoryJobQueue>,
        service: OrderService,
        gate: FeatureGate,
        operator: Subject,
        product: ProductId,
    }

    async fn fixture() -> Fixture {
        let memory = Arc::new(InMemoryStore::new());
        let stores = Stores::from_memory(memory.clone());
        let queue = InMemoryJobQueue::arc();
        let gate = FeatureGate::new(stores.toggles.clone());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let service = OrderService::new(stores, queue.clone(), gate.clone(), clock);

        let company = CompanyId::new();
        let operator = Subject::new(UserId::new(), company, Role::Operator);
        let product = Product::new(ProductId::new(), company, "SKU-1", "Widget", 10, Utc::now()).unwrap();
        memory.insert(&product).await.unwrap();
        Fixture {
            memory,
            queue,
            service,
            gate,
            operator,
            product: product.id_typed(),
        }
    }

    #[tokio::test]
    async fn create_places_pending_order_and_queues_it() {
        let fx = fixture().await;
        let order = fx
            .service
            .create(&fx.operator, NewOrder { product_id: fx.product, quantity: 3 })
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.reference_code().starts_with("ORD-"));
        assert_eq!(fx.queue.stats(fx.operator.company_id).await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn reference_collision_draws_a_new_code() {
        let fx = fixture().await;
        let codes = std::sync::Mutex::new(
            ["ORD-0000000A", "ORD-0000000A", "ORD-0000000A", "ORD-0000000B"]
                .map(String::from)
                .into_iter(),
        );
        let service = fx.service.clone().with_reference_generator(move || {
            codes
                .lock()
                .unwrap()
                .next()
                .unwrap_or_else(generate_reference_code)
        });
        let line = NewOrder { product_id: fx.product, quantity: 1 };

        let first = service.create(&fx.operator, line).await.unwrap();
        let second = service.create(&fx.operator, line).await.unwrap();

        assert_eq!(first.reference_code(), "ORD-0000000A");
        assert_eq!(second.reference_code(), "ORD-0000000B");
        assert_eq!(fx.queue.stats(fx.operator.company_id).await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn foreign_product_is_rejected() {
        let fx = fixture().await;
        let outsider = Subject::new(UserId::new(), CompanyId::new(), Role::Operator);
        let err = fx
            .service
            .create(&outsider, NewOrder { product_id: fx.product, quantity: 1 })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Validation("product does not belong to your company".to_string())
        );
    }

    #[tokio::test]
    async fn zero_quantity_is_a_validation_error() {
        let fx = fixture().await;
        let err = fx
            .service
            .create(&fx.operator, NewOrder { product_id: fx.product, quantity: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn stored_block_flag_wins_over_subject() {
        let fx = fixture().await;
        fx.memory
            .upsert_profile(&UserProfile {
                user_id: fx.operator.user_id,
                company_id: fx.operator.company_id,
                username: "sam".to_string(),
                role: Role::Operator,
                is_blocked: true,
            })
            .await
            .unwrap();

        let err = fx
            .service
            .create(&fx.operator, NewOrder { product_id: fx.product, quantity: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn bulk_is_all_or_nothing() {
        let fx = fixture().await;
        let lines = [
            NewOrder { product_id: fx.product, quantity: 1 },
            NewOrder { product_id: ProductId::new(), quantity: 1 },
        ];
        let err = fx.service.bulk_create(&fx.operator, &lines).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref msg) if msg.starts_with("line 2")));
        assert!(fx
            .service
            .list(&fx.operator, OrderFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn bulk_respects_feature_toggle() {
        let fx = fixture().await;
        fx.gate
            .set(fx.operator.company_id, Feature::BulkOrders, false)
            .await
            .unwrap();
        let lines = [NewOrder { product_id: fx.product, quantity: 1 }];
        assert_eq!(
            fx.service.bulk_create(&fx.operator, &lines).await.unwrap_err(),
            ServiceError::FeatureDisabled(Feature::BulkOrders)
        );
    }

    #[tokio::test]
    async fn operators_only_list_their_own_orders() {
        let fx = fixture().await;
        let colleague = Subject::new(UserId::new(), fx.operator.company_id, Role::Operator);
        let admin = Subject::new(UserId::new(), fx.operator.company_id, Role::Admin);
        let line = NewOrder { product_id: fx.product, quantity: 1 };
        fx.service.create(&fx.operator, line).await.unwrap();
        let theirs = fx.service.create(&colleague, line).await.unwrap();

        assert_eq!(fx.service.list(&fx.operator, OrderFilter::default()).await.unwrap().len(), 1);
        assert_eq!(fx.service.list(&admin, OrderFilter::default()).await.unwrap().len(), 2);
        assert_eq!(
            fx.service.get(&fx.operator, theirs.id_typed()).await.unwrap_err(),
            ServiceError::NotFound
        );
    }

    #[tokio::test]
    async fn queue_outage_leaves_order_pending() {
        let fx = fixture().await;
        fx.queue.set_offline(true);
        let err = fx
            .service
            .create(&fx.operator, NewOrder { product_id: fx.product, quantity: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transient(_)));

        let stored = fx.service.list(&fx.operator, OrderFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn catalog_hides_inactive_products() {
        let fx = fixture().await;
        let mut retired = Product::new(
            ProductId::new(),
            fx.operator.company_id,
            "SKU-OLD",
            "Retired",
            3,
            Utc::now(),
        )
        .unwrap();
        retired.deactivate(Utc::now());
        fx.memory.insert(&retired).await.unwrap();

        let catalog = fx.service.catalog(&fx.operator).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].id_typed(), fx.product);
    }
}
