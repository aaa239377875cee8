//! Order lifecycle domain module.
//!
//! The order state machine is implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage). Randomness enters only through the
//! injectable [`ApprovalSource`] and [`LatencyRange`].

pub mod decision;
pub mod order;
pub mod transition;

pub use decision::{ApprovalSource, FixedApproval, LatencyRange, RandomApproval, ScriptedApproval};
pub use order::{
    generate_reference_code, BeginProcessing, Decision, FailureReason, Order, OrderApproved,
    OrderCommand, OrderEvent, OrderFailed, OrderPlaced, OrderStatus, PlaceOrder, ProcessingStarted,
    ProductRef, RecordDecision, RequestRetry, RetryRequested,
};
pub use transition::TransitionRecord;
