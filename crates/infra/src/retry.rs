//! Retry coordination: put a failed order back to `pending` and hand it to
//! the processing workers again.

use std::sync::Arc;

use tracing::{error, info};

use logiport_auth::{Capability, Subject};
use logiport_core::{Aggregate, AggregateRoot, Clock, ExpectedVersion, OrderId};
use logiport_orders::{Order, OrderCommand, RequestRetry};

use crate::jobs::{Job, JobQueue};
use crate::services::{admit, visible_to, ServiceError};
use crate::store::Stores;
use crate::transitions::log_events;

#[derive(Clone)]
pub struct RetryCoordinator {
    stores: Stores,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
}

impl RetryCoordinator {
    pub fn new(stores: Stores, queue: Arc<dyn JobQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            stores,
            queue,
            clock,
        }
    }

    /// `failed -> pending`, then enqueue processing.
    ///
    /// Of two concurrent retries exactly one wins; the other sees a
    /// conflict. When the enqueue fails the order stays `pending` and the
    /// error is transient: `requeue_pending` re-drives it.
    pub async fn retry(&self, subject: &Subject, order_id: OrderId) -> Result<Order, ServiceError> {
        admit(self.stores.directory.as_ref(), subject, Capability::RetryOrders).await?;

        let order = self
            .stores
            .orders
            .get(subject.company_id, order_id)
            .await?
            .filter(|order| visible_to(subject, order))
            .ok_or(ServiceError::NotFound)?;

        let mut next = order.clone();
        let events = next.execute(&OrderCommand::RequestRetry(RequestRetry {
            occurred_at: self.clock.now(),
        }))?;
        self.stores
            .orders
            .commit(&next, ExpectedVersion::Exact(order.version()), None)
            .await?;
        log_events(&events);

        self.queue
            .enqueue(Job::process_order(subject.company_id, order_id))
            .await
            .map_err(|e| {
                error!(
                    alert = true,
                    order_id = %order_id,
                    company_id = %subject.company_id,
                    error = %e,
                    "retried order is pending but was not queued; requeue_pending re-drives it"
                );
                ServiceError::Transient(format!(
                    "order {} is pending but could not be queued: {e}",
                    next.reference_code()
                ))
            })?;

        info!(
            order_id = %order_id,
            reference_code = %next.reference_code(),
            requested_by = %subject.user_id,
            "order retry queued"
        );
        Ok(next)
    }
}
