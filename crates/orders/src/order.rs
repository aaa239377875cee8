use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use logiport_core::{
    Aggregate, AggregateRoot, CompanyId, DomainError, OrderId, ProductId, UserId,
};
use logiport_products::{Product, StockDeduction, INSUFFICIENT_STOCK};

/// Order status lifecycle.
///
/// `pending -> processing -> {approved, failed}` and `failed -> pending`
/// (retry). `approved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Approved,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Approved => "approved",
            OrderStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the (simulated) external approval call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    /// The call did not resolve within the processing bound.
    TimedOut,
}

/// Why an order ended up `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Rejected,
    InsufficientStock,
    TimedOut,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Rejected => "rejected by approval service",
            FailureReason::InsufficientStock => INSUFFICIENT_STOCK,
            FailureReason::TimedOut => "processing timed out",
        }
    }
}

impl core::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ORD-` followed by eight upper-case hex digits.
pub fn generate_reference_code() -> String {
    format!("ORD-{:08X}", rand::thread_rng().r#gen::<u32>())
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    company_id: Option<CompanyId>,
    requested_by: Option<UserId>,
    product_id: Option<ProductId>,
    quantity: u32,
    reference_code: String,
    status: OrderStatus,
    has_been_processed: bool,
    failure_reason: Option<FailureReason>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            company_id: None,
            requested_by: None,
            product_id: None,
            quantity: 0,
            reference_code: String::new(),
            status: OrderStatus::Pending,
            has_been_processed: false,
            failure_reason: None,
            created_at: None,
            updated_at: None,
            version: 0,
        }
    }

    /// Validate and place a new order (`create() -> pending`).
    pub fn place(cmd: PlaceOrder) -> Result<(Self, OrderEvent), DomainError> {
        let mut order = Self::empty(cmd.order_id);
        let events = order.execute(&OrderCommand::Place(cmd))?;
        let placed = events
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::invariant("placing an order emitted no event"))?;
        Ok((order, placed))
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn reference_code(&self) -> &str {
        &self.reference_code
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn has_been_processed(&self) -> bool {
        self.has_been_processed
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure_reason
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_placed(&self) -> bool {
        self.company_id.is_some()
    }

    /// Retry is only legal for failed orders that went through a decision.
    pub fn is_retry_allowed(&self) -> bool {
        self.status == OrderStatus::Failed && self.has_been_processed
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Minimal view of the product an order is placed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub is_active: bool,
}

impl From<&Product> for ProductRef {
    fn from(p: &Product) -> Self {
        use logiport_core::Entity;
        Self {
            product_id: p.id_typed(),
            company_id: p.company_id(),
            is_active: p.can_be_ordered(),
        }
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub requested_by: UserId,
    pub product: ProductRef,
    pub quantity: u32,
    pub reference_code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BeginProcessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginProcessing {
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDecision.
///
/// `available_stock` is the product's stock as read by the caller; the store
/// re-checks it atomically when committing an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecision {
    pub decision: Decision,
    pub available_stock: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestRetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRetry {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Place(PlaceOrder),
    BeginProcessing(BeginProcessing),
    RecordDecision(RecordDecision),
    RequestRetry(RequestRetry),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub requested_by: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub reference_code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProcessingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStarted {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved. Carries the stock that must be taken with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub deduction: StockDeduction,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailed {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub reason: FailureReason,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RetryRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRequested {
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    ProcessingStarted(ProcessingStarted),
    Approved(OrderApproved),
    Failed(OrderFailed),
    RetryRequested(RetryRequested),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "order.placed",
            OrderEvent::ProcessingStarted(_) => "order.processing_started",
            OrderEvent::Approved(_) => "order.approved",
            OrderEvent::Failed(_) => "order.failed",
            OrderEvent::RetryRequested(_) => "order.retry_requested",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::ProcessingStarted(e) => e.occurred_at,
            OrderEvent::Approved(e) => e.occurred_at,
            OrderEvent::Failed(e) => e.occurred_at,
            OrderEvent::RetryRequested(e) => e.occurred_at,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Placed(e) => e.order_id,
            OrderEvent::ProcessingStarted(e) => e.order_id,
            OrderEvent::Approved(e) => e.order_id,
            OrderEvent::Failed(e) => e.order_id,
            OrderEvent::RetryRequested(e) => e.order_id,
        }
    }

    pub fn company_id(&self) -> CompanyId {
        match self {
            OrderEvent::Placed(e) => e.company_id,
            OrderEvent::ProcessingStarted(e) => e.company_id,
            OrderEvent::Approved(e) => e.company_id,
            OrderEvent::Failed(e) => e.company_id,
            OrderEvent::RetryRequested(e) => e.company_id,
        }
    }

    /// `(from, to)` of the status change this event describes.
    pub fn transition(&self) -> (Option<OrderStatus>, OrderStatus) {
        match self {
            OrderEvent::Placed(_) => (None, OrderStatus::Pending),
            OrderEvent::ProcessingStarted(_) => {
                (Some(OrderStatus::Pending), OrderStatus::Processing)
            }
            OrderEvent::Approved(_) => (Some(OrderStatus::Processing), OrderStatus::Approved),
            OrderEvent::Failed(_) => (Some(OrderStatus::Processing), OrderStatus::Failed),
            OrderEvent::RetryRequested(_) => (Some(OrderStatus::Failed), OrderStatus::Pending),
        }
    }

    /// Stock that has to be deducted atomically with this event, if any.
    pub fn stock_deduction(&self) -> Option<StockDeduction> {
        match self {
            OrderEvent::Approved(e) => Some(e.deduction),
            _ => None,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.company_id = Some(e.company_id);
                self.requested_by = Some(e.requested_by);
                self.product_id = Some(e.product_id);
                self.quantity = e.quantity;
                self.reference_code = e.reference_code.clone();
                self.status = OrderStatus::Pending;
                self.has_been_processed = false;
                self.failure_reason = None;
                self.created_at = Some(e.occurred_at);
            }
            OrderEvent::ProcessingStarted(_) => {
                self.status = OrderStatus::Processing;
            }
            OrderEvent::Approved(_) => {
                self.status = OrderStatus::Approved;
                self.has_been_processed = true;
                self.failure_reason = None;
            }
            OrderEvent::Failed(e) => {
                self.status = OrderStatus::Failed;
                self.has_been_processed = true;
                self.failure_reason = Some(e.reason);
            }
            OrderEvent::RetryRequested(_) => {
                self.status = OrderStatus::Pending;
                self.has_been_processed = false;
                self.failure_reason = None;
            }
        }

        self.updated_at = Some(event.occurred_at());
        // +1 per applied event; doubles as the conditional-update guard.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Place(cmd) => self.handle_place(cmd),
            OrderCommand::BeginProcessing(cmd) => self.handle_begin(cmd),
            OrderCommand::RecordDecision(cmd) => self.handle_decision(cmd),
            OrderCommand::RequestRetry(cmd) => self.handle_retry(cmd),
        }
    }
}

impl Order {
    fn placed_company(&self) -> Result<CompanyId, DomainError> {
        self.company_id.ok_or(DomainError::NotFound)
    }

    fn illegal(&self, action: &str) -> DomainError {
        DomainError::conflict(format!(
            "cannot {action} order {} in status {}",
            self.reference_code, self.status
        ))
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.is_placed() {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.product.company_id != cmd.company_id {
            return Err(DomainError::validation(
                "product does not belong to your company",
            ));
        }
        if !cmd.product.is_active {
            return Err(DomainError::validation("product is not available for ordering"));
        }
        if cmd.reference_code.trim().is_empty() {
            return Err(DomainError::validation("reference code is required"));
        }

        Ok(vec![OrderEvent::Placed(OrderPlaced {
            company_id: cmd.company_id,
            order_id: cmd.order_id,
            requested_by: cmd.requested_by,
            product_id: cmd.product.product_id,
            quantity: cmd.quantity,
            reference_code: cmd.reference_code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_begin(&self, cmd: &BeginProcessing) -> Result<Vec<OrderEvent>, DomainError> {
        let company_id = self.placed_company()?;
        if self.status != OrderStatus::Pending {
            return Err(self.illegal("begin processing"));
        }

        Ok(vec![OrderEvent::ProcessingStarted(ProcessingStarted {
            company_id,
            order_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decision(&self, cmd: &RecordDecision) -> Result<Vec<OrderEvent>, DomainError> {
        let company_id = self.placed_company()?;
        if self.status != OrderStatus::Processing {
            return Err(self.illegal("record a decision for"));
        }
        let product_id = self
            .product_id
            .ok_or_else(|| DomainError::invariant("placed order without product"))?;

        let failed = |reason| {
            OrderEvent::Failed(OrderFailed {
                company_id,
                order_id: self.id,
                reason,
                occurred_at: cmd.occurred_at,
            })
        };

        let event = match cmd.decision {
            // Stock shortfall overrides a positive draw.
            Decision::Approved if cmd.available_stock < self.quantity => {
                failed(FailureReason::InsufficientStock)
            }
            Decision::Approved => OrderEvent::Approved(OrderApproved {
                company_id,
                order_id: self.id,
                deduction: StockDeduction {
                    product_id,
                    quantity: self.quantity,
                },
                occurred_at: cmd.occurred_at,
            }),
            Decision::Rejected => failed(FailureReason::Rejected),
            Decision::TimedOut => failed(FailureReason::TimedOut),
        };

        Ok(vec![event])
    }

    fn handle_retry(&self, cmd: &RequestRetry) -> Result<Vec<OrderEvent>, DomainError> {
        let company_id = self.placed_company()?;
        if self.status != OrderStatus::Failed {
            return Err(self.illegal("retry"));
        }
        if !self.has_been_processed {
            return Err(DomainError::conflict(format!(
                "order {} has not been processed yet",
                self.reference_code
            )));
        }

        Ok(vec![OrderEvent::RetryRequested(RetryRequested {
            company_id,
            order_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn placed(quantity: u32) -> Order {
        let company_id = CompanyId::new();
        let (order, _) = Order::place(PlaceOrder {
            company_id,
            order_id: OrderId::new(),
            requested_by: UserId::new(),
            product: ProductRef {
                product_id: ProductId::new(),
                company_id,
                is_active: true,
            },
            quantity,
            reference_code: "ORD-0000000A".to_string(),
            occurred_at: test_time(),
        })
        .unwrap();
        order
    }

    fn begin(order: &mut Order) {
        order
            .execute(&OrderCommand::BeginProcessing(BeginProcessing {
                occurred_at: test_time(),
            }))
            .unwrap();
    }

    fn decide(order: &mut Order, decision: Decision, stock: u32) -> Vec<OrderEvent> {
        order
            .execute(&OrderCommand::RecordDecision(RecordDecision {
                decision,
                available_stock: stock,
                occurred_at: test_time(),
            }))
            .unwrap()
    }

    fn retry_cmd() -> OrderCommand {
        OrderCommand::RequestRetry(RequestRetry {
            occurred_at: test_time(),
        })
    }

    #[test]
    fn place_emits_placed_event_and_starts_pending() {
        let order = placed(2);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(!order.has_been_processed());
        assert_eq!(order.version(), 1);
        assert_eq!(order.quantity(), 2);
    }

    #[test]
    fn place_rejects_zero_quantity_and_foreign_product() {
        let company_id = CompanyId::new();
        let mut cmd = PlaceOrder {
            company_id,
            order_id: OrderId::new(),
            requested_by: UserId::new(),
            product: ProductRef {
                product_id: ProductId::new(),
                company_id,
                is_active: true,
            },
            quantity: 0,
            reference_code: "ORD-1".to_string(),
            occurred_at: test_time(),
        };
        assert!(matches!(
            Order::place(cmd.clone()),
            Err(DomainError::Validation(_))
        ));

        cmd.quantity = 1;
        cmd.product.company_id = CompanyId::new();
        match Order::place(cmd) {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("your company")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn full_lifecycle_pending_processing_approved() {
        let mut order = placed(2);
        begin(&mut order);
        assert_eq!(order.status(), OrderStatus::Processing);

        let events = decide(&mut order, Decision::Approved, 10);
        assert_eq!(order.status(), OrderStatus::Approved);
        assert!(order.has_been_processed());
        assert_eq!(
            events[0].stock_deduction().map(|d| d.quantity),
            Some(2)
        );
        assert_eq!(order.version(), 3);
    }

    #[test]
    fn insufficient_stock_forces_failure_even_when_approved() {
        let mut order = placed(5);
        begin(&mut order);

        let events = decide(&mut order, Decision::Approved, 3);
        assert_eq!(order.status(), OrderStatus::Failed);
        assert_eq!(order.failure_reason(), Some(FailureReason::InsufficientStock));
        assert_eq!(order.failure_reason().unwrap().as_str(), "insufficient stock");
        assert!(events[0].stock_deduction().is_none());
    }

    #[test]
    fn timeout_is_a_failure_that_can_be_retried() {
        let mut order = placed(1);
        begin(&mut order);
        decide(&mut order, Decision::TimedOut, 10);
        assert_eq!(order.failure_reason(), Some(FailureReason::TimedOut));
        assert!(order.is_retry_allowed());
    }

    #[test]
    fn begin_processing_twice_is_a_conflict() {
        let mut order = placed(1);
        begin(&mut order);
        let err = order
            .handle(&OrderCommand::BeginProcessing(BeginProcessing {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn decision_requires_processing() {
        let order = placed(1);
        let err = order
            .handle(&OrderCommand::RecordDecision(RecordDecision {
                decision: Decision::Approved,
                available_stock: 10,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn retry_resets_failed_order_to_pending() {
        let mut order = placed(1);
        begin(&mut order);
        decide(&mut order, Decision::Rejected, 10);

        order.execute(&retry_cmd()).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(!order.has_been_processed());
        assert_eq!(order.failure_reason(), None);

        // and may be processed again
        begin(&mut order);
        decide(&mut order, Decision::Approved, 1);
        assert_eq!(order.status(), OrderStatus::Approved);
    }

    #[test]
    fn retry_is_rejected_for_pending_processing_and_approved() {
        let mut order = placed(1);
        assert!(order.handle(&retry_cmd()).unwrap_err().is_conflict());

        begin(&mut order);
        assert!(order.handle(&retry_cmd()).unwrap_err().is_conflict());

        decide(&mut order, Decision::Approved, 1);
        assert!(order.handle(&retry_cmd()).unwrap_err().is_conflict());
    }

    #[test]
    fn approved_never_re_enters_processing() {
        let mut order = placed(1);
        begin(&mut order);
        decide(&mut order, Decision::Approved, 1);
        let err = order
            .handle(&OrderCommand::BeginProcessing(BeginProcessing {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let mut order = placed(1);
        begin(&mut order);
        let before = order.clone();

        let cmd = OrderCommand::RecordDecision(RecordDecision {
            decision: Decision::Approved,
            available_stock: 4,
            occurred_at: test_time(),
        });
        let events1 = order.handle(&cmd).unwrap();
        let events2 = order.handle(&cmd).unwrap();

        assert_eq!(order, before);
        assert_eq!(events1, events2);
    }

    #[test]
    fn event_transitions_match_applied_status() {
        let mut order = placed(1);
        begin(&mut order);
        let events = decide(&mut order, Decision::Rejected, 0);
        assert_eq!(
            events[0].transition(),
            (Some(OrderStatus::Processing), OrderStatus::Failed)
        );
        assert_eq!(events[0].event_type(), "order.failed");
    }

    #[test]
    fn reference_codes_have_expected_shape() {
        let code = generate_reference_code();
        assert_eq!(code.len(), 12);
        assert!(code.starts_with("ORD-"));
        assert!(code[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Begin,
            Decide(Decision, u32),
            Retry,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                Just(Step::Begin),
                (
                    prop_oneof![
                        Just(Decision::Approved),
                        Just(Decision::Rejected),
                        Just(Decision::TimedOut)
                    ],
                    0u32..10
                )
                    .prop_map(|(d, s)| Step::Decide(d, s)),
                Just(Step::Retry),
            ]
        }

        fn legal(from: OrderStatus, to: OrderStatus, processed_before: bool) -> bool {
            matches!(
                (from, to),
                (OrderStatus::Pending, OrderStatus::Processing)
                    | (OrderStatus::Processing, OrderStatus::Approved)
                    | (OrderStatus::Processing, OrderStatus::Failed)
            ) || (from == OrderStatus::Failed && to == OrderStatus::Pending && processed_before)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: arbitrary command sequences only ever produce legal transitions.
            #[test]
            fn only_legal_transitions(steps in proptest::collection::vec(step(), 0..30)) {
                let mut order = placed(3);
                for s in steps {
                    let cmd = match s {
                        Step::Begin => OrderCommand::BeginProcessing(BeginProcessing { occurred_at: test_time() }),
                        Step::Decide(decision, available_stock) => OrderCommand::RecordDecision(RecordDecision {
                            decision,
                            available_stock,
                            occurred_at: test_time(),
                        }),
                        Step::Retry => OrderCommand::RequestRetry(RequestRetry { occurred_at: test_time() }),
                    };
                    let before = order.status();
                    let processed_before = order.has_been_processed();
                    if let Ok(events) = order.execute(&cmd) {
                        prop_assert!(legal(before, order.status(), processed_before));
                        for e in &events {
                            if let Some(d) = e.stock_deduction() {
                                prop_assert_eq!(d.quantity, 3);
                            }
                        }
                    }
                    if before == OrderStatus::Approved {
                        prop_assert_eq!(order.status(), OrderStatus::Approved);
                    }
                }
            }
        }
    }
}
