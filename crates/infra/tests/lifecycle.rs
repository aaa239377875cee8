//! End-to-end order and export lifecycle against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use logiport_auth::{Role, Subject};
use logiport_core::{CompanyId, ManualClock, ProductId, UserId};
use logiport_infra::features::Feature;
use logiport_infra::jobs::JobExecutorConfig;
use logiport_infra::ratelimit::{BucketParams, EndpointClass, RateLimits};
use logiport_infra::services::NewOrder;
use logiport_infra::store::{Company, OrderFilter, UserProfile};
use logiport_infra::{AppConfig, Backend, Components, ServiceError};
use logiport_orders::{
    ApprovalSource, FailureReason, FixedApproval, LatencyRange, OrderStatus, ScriptedApproval,
};
use logiport_products::Product;

struct World {
    backend: Backend,
    operator: Subject,
    admin: Subject,
    product: ProductId,
}

async fn world(approval: Arc<dyn ApprovalSource>, stock: u32) -> World {
    world_with(Components::in_memory(approval, LatencyRange::none()), &AppConfig::default(), stock).await
}

async fn world_with(components: Components, config: &AppConfig, stock: u32) -> World {
    let backend = Backend::assemble(components, config);
    let company = CompanyId::new();
    let operator = Subject::new(UserId::new(), company, Role::Operator);
    let admin = Subject::new(UserId::new(), company, Role::Admin);

    let directory = &backend.stores.directory;
    directory
        .upsert_company(&Company {
            id: company,
            name: "Northwind".to_string(),
        })
        .await
        .unwrap();
    for (subject, name) in [(&operator, "olive"), (&admin, "ada")] {
        directory
            .upsert_profile(&UserProfile {
                user_id: subject.user_id,
                company_id: company,
                username: name.to_string(),
                role: subject.role,
                is_blocked: false,
            })
            .await
            .unwrap();
    }

    let product = Product::new(ProductId::new(), company, "NW-1", "Crate", stock, Utc::now()).unwrap();
    backend.stores.products.insert(&product).await.unwrap();

    World {
        backend,
        operator,
        admin,
        product: product.id_typed(),
    }
}

impl World {
    async fn stock(&self) -> u32 {
        self.backend
            .stores
            .products
            .get(self.operator.company_id, self.product)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity()
    }

    fn line(&self, quantity: u32) -> NewOrder {
        NewOrder {
            product_id: self.product,
            quantity,
        }
    }
}

#[tokio::test]
async fn order_is_approved_then_exported() {
    let w = world(Arc::new(FixedApproval(true)), 10).await;

    let order = w.backend.orders.create(&w.operator, w.line(4)).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);

    w.backend.executor().run_until_idle().await.unwrap();
    let order = w.backend.orders.get(&w.operator, order.id_typed()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Approved);
    assert_eq!(w.stock().await, 6);

    let export = w
        .backend
        .exports
        .create(&w.operator, vec![order.id_typed()], None)
        .await
        .unwrap();
    w.backend.executor().run_until_idle().await.unwrap();

    let download = w.backend.exports.download(&w.operator, export.id_typed()).await.unwrap();
    let csv = String::from_utf8(download.bytes).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Reference Code,Product,SKU,Quantity,Status,Created By,Company,Created At")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with(order.reference_code()));
    assert!(row.contains(",Crate,NW-1,4,approved,olive,Northwind,"));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn rejected_order_can_be_retried_once_processed() {
    let w = world(Arc::new(ScriptedApproval::new([false, true])), 10).await;

    let order = w.backend.orders.create(&w.operator, w.line(2)).await.unwrap();
    w.backend.executor().run_until_idle().await.unwrap();
    let failed = w.backend.orders.get(&w.operator, order.id_typed()).await.unwrap();
    assert_eq!(failed.status(), OrderStatus::Failed);
    assert_eq!(failed.failure_reason(), Some(FailureReason::Rejected));
    assert_eq!(w.stock().await, 10);

    let retried = w.backend.orders.retry(&w.operator, order.id_typed()).await.unwrap();
    assert_eq!(retried.status(), OrderStatus::Pending);
    w.backend.executor().run_until_idle().await.unwrap();

    let approved = w.backend.orders.get(&w.operator, order.id_typed()).await.unwrap();
    assert_eq!(approved.status(), OrderStatus::Approved);
    assert_eq!(w.stock().await, 8);

    assert!(w
        .backend
        .orders
        .retry(&w.operator, order.id_typed())
        .await
        .unwrap_err()
        .is_conflict());
}

#[tokio::test]
async fn worker_pool_never_oversells() {
    let w = world(Arc::new(FixedApproval(true)), 5).await;
    let lines = vec![w.line(2); 6];
    w.backend.admin.set_feature(&w.admin, Feature::BulkOrders, true).await.unwrap();
    w.backend.orders.bulk_create(&w.operator, &lines).await.unwrap();

    let handle = w.backend.executor().spawn(
        JobExecutorConfig::default()
            .with_workers(4)
            .with_poll_interval(Duration::from_millis(5)),
    );
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let pending = w
            .backend
            .orders
            .list(&w.admin, OrderFilter::status(OrderStatus::Pending))
            .await
            .unwrap()
            .len()
            + w.backend
                .orders
                .list(&w.admin, OrderFilter::status(OrderStatus::Processing))
                .await
                .unwrap()
                .len();
        if pending == 0 || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown().await;

    let approved = w
        .backend
        .orders
        .list(&w.admin, OrderFilter::status(OrderStatus::Approved))
        .await
        .unwrap();
    let failed = w
        .backend
        .orders
        .list(&w.admin, OrderFilter::status(OrderStatus::Failed))
        .await
        .unwrap();
    assert_eq!(approved.len(), 2);
    assert_eq!(failed.len(), 4);
    assert!(failed
        .iter()
        .all(|o| o.failure_reason() == Some(FailureReason::InsufficientStock)));
    assert_eq!(w.stock().await, 1);
}

#[tokio::test]
async fn export_ignores_other_companies_orders() {
    let w = world(Arc::new(FixedApproval(true)), 10).await;
    let other = world(Arc::new(FixedApproval(true)), 10).await;
    let mine = w.backend.orders.create(&w.operator, w.line(1)).await.unwrap();
    let theirs = other.backend.orders.create(&other.operator, other.line(1)).await.unwrap();

    let export = w
        .backend
        .exports
        .create(&w.operator, vec![mine.id_typed(), theirs.id_typed()], None)
        .await
        .unwrap();
    w.backend.executor().run_until_idle().await.unwrap();

    let csv = String::from_utf8(
        w.backend
            .exports
            .download(&w.operator, export.id_typed())
            .await
            .unwrap()
            .bytes,
    )
    .unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(!csv.contains(theirs.reference_code()));
}

#[tokio::test]
async fn rate_limit_denies_then_recovers() {
    let clock = Arc::new(ManualClock::starting_now());
    let mut components = Components::in_memory(Arc::new(FixedApproval(true)), LatencyRange::none());
    components.clock = clock.clone();
    let config = AppConfig {
        rate_limits: RateLimits::default().with(
            EndpointClass::Exports,
            BucketParams::per_period(10, Duration::from_secs(60)),
        ),
        ..AppConfig::default()
    };
    let w = world_with(components, &config, 1).await;
    let limiter = &w.backend.limiter;

    for _ in 0..10 {
        assert!(limiter.allow(&w.operator, EndpointClass::Exports).await.is_permit());
    }
    let denied = limiter.allow(&w.operator, EndpointClass::Exports).await;
    assert_eq!(denied.retry_after_secs(), Some(6));

    // Other classes and other users have their own buckets.
    assert!(limiter.allow(&w.operator, EndpointClass::Orders).await.is_permit());
    assert!(limiter.allow(&w.admin, EndpointClass::Exports).await.is_permit());

    clock.advance(Duration::from_secs(6));
    assert!(limiter.allow(&w.operator, EndpointClass::Exports).await.is_permit());
    assert!(!limiter.allow(&w.operator, EndpointClass::Exports).await.is_permit());
}

#[tokio::test]
async fn blocked_repeat_offender_cannot_order() {
    let w = world(Arc::new(FixedApproval(false)), 10).await;
    for _ in 0..3 {
        w.backend.orders.create(&w.operator, w.line(1)).await.unwrap();
    }
    w.backend.executor().run_until_idle().await.unwrap();

    let blocked = w
        .backend
        .admin
        .block_repeat_offenders(&w.admin, 3)
        .await
        .unwrap();
    assert_eq!(blocked, vec![w.operator.user_id]);

    assert!(matches!(
        w.backend.orders.create(&w.operator, w.line(1)).await,
        Err(ServiceError::Unauthorized(_))
    ));
}
