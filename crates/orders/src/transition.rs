//! Structured record of a single order status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logiport_core::{CompanyId, OrderId};

use crate::order::{OrderEvent, OrderStatus};

/// One audit entry per status change. `from` is `None` for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub order_id: OrderId,
    pub company_id: CompanyId,
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl TransitionRecord {
    pub fn is_failure(&self) -> bool {
        self.to == OrderStatus::Failed
    }
}

impl From<&OrderEvent> for TransitionRecord {
    fn from(event: &OrderEvent) -> Self {
        let (from, to) = event.transition();
        let reason = match event {
            OrderEvent::Failed(e) => Some(e.reason.to_string()),
            OrderEvent::RetryRequested(_) => Some("retry requested".to_string()),
            _ => None,
        };
        Self {
            order_id: event.order_id(),
            company_id: event.company_id(),
            from,
            to,
            at: event.occurred_at(),
            reason,
        }
    }
}
