//! Structured log records for order status changes.

use tracing::{info, warn};

use logiport_orders::{OrderEvent, TransitionRecord};

/// Emit one record: `info` for progress, `warn` when the order failed.
pub fn log_transition(record: &TransitionRecord) {
    let from = record.from.map(|s| s.as_str()).unwrap_or("none");
    let at = record.at.to_rfc3339();
    let reason = record.reason.as_deref().unwrap_or("");

    if record.is_failure() {
        warn!(
            order_id = %record.order_id,
            company_id = %record.company_id,
            from,
            to = %record.to,
            at = %at,
            reason,
            "order transition"
        );
    } else {
        info!(
            order_id = %record.order_id,
            company_id = %record.company_id,
            from,
            to = %record.to,
            at = %at,
            reason,
            "order transition"
        );
    }
}

pub fn log_events(events: &[OrderEvent]) {
    for event in events {
        log_transition(&TransitionRecord::from(event));
    }
}
