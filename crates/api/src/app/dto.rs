use serde::Deserialize;

use logiport_core::{OrderId, ProductId};
use logiport_exports::Export;
use logiport_infra::jobs::{DeadLetterEntry, Job};
use logiport_infra::services::NewOrder;
use logiport_orders::{Order, OrderStatus};
use logiport_products::Product;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl From<CreateOrderRequest> for NewOrder {
    fn from(value: CreateOrderRequest) -> Self {
        NewOrder {
            product_id: value.product_id,
            quantity: value.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkOrderRequest {
    pub lines: Vec<CreateOrderRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

impl ListOrdersQuery {
    pub fn status(&self) -> Result<Option<OrderStatus>, String> {
        let Some(raw) = self.status.as_deref() else {
            return Ok(None);
        };
        let status = match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => OrderStatus::Pending,
            "processing" => OrderStatus::Processing,
            "approved" => OrderStatus::Approved,
            "failed" => OrderStatus::Failed,
            other => return Err(format!("unknown order status '{other}'")),
        };
        Ok(Some(status))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateExportRequest {
    pub order_ids: Vec<OrderId>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectOrdersRequest {
    pub order_ids: Vec<OrderId>,
}

#[derive(Debug, Deserialize)]
pub struct BlockOffendersRequest {
    pub threshold: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetFeatureRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn order_to_json(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "id": order.id_typed().to_string(),
        "reference_code": order.reference_code(),
        "product_id": order.product_id().map(|id| id.to_string()),
        "quantity": order.quantity(),
        "status": order.status().as_str(),
        "failure_reason": order.failure_reason().map(|r| r.as_str()),
        "created_at": order.created_at().map(|t| t.to_rfc3339()),
        "updated_at": order.updated_at().map(|t| t.to_rfc3339()),
    })
}

pub fn export_to_json(export: &Export) -> serde_json::Value {
    serde_json::json!({
        "id": export.id_typed().to_string(),
        "status": export.status().to_string(),
        "order_count": export.order_ids().len(),
        "note": export.note(),
        "failure_reason": export.failure_reason(),
        "created_at": export.created_at().to_rfc3339(),
        "completed_at": export.completed_at().map(|t| t.to_rfc3339()),
    })
}

pub fn product_to_json(product: &Product) -> serde_json::Value {
    serde_json::json!({
        "id": product.id_typed().to_string(),
        "sku": product.sku(),
        "name": product.name(),
        "stock_quantity": product.stock_quantity(),
    })
}

pub fn job_to_json(job: &Job) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "type": job.kind.type_name(),
        "status": job.status,
        "attempt": job.attempt,
    })
}

pub fn dead_letter_to_json(entry: &DeadLetterEntry) -> serde_json::Value {
    serde_json::json!({
        "job": job_to_json(&entry.job),
        "reason": entry.reason,
        "dead_lettered_at": entry.dead_lettered_at.to_rfc3339(),
    })
}
