use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use logiport_auth::Subject;
use logiport_core::OrderId;
use logiport_infra::services::NewOrder;
use logiport_infra::store::OrderFilter;
use logiport_infra::Backend;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/bulk", post(bulk_create_orders))
        .route("/:id", get(get_order))
        .route("/:id/retry", post(retry_order))
}

/// POST /orders
pub async fn create_order(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    match backend.orders.create(&subject, body.into()).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /orders/bulk
pub async fn bulk_create_orders(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::BulkOrderRequest>,
) -> axum::response::Response {
    let lines: Vec<NewOrder> = body.lines.into_iter().map(NewOrder::from).collect();
    match backend.orders.bulk_create(&subject, &lines).await {
        Ok(orders) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "orders": orders.iter().map(dto::order_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /orders?status=failed
pub async fn list_orders(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    let status = match query.status() {
        Ok(status) => status,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
    };
    let filter = OrderFilter {
        status,
        requested_by: None,
    };
    match backend.orders.list(&subject, filter).await {
        Ok(orders) => Json(serde_json::json!({
            "orders": orders.iter().map(dto::order_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /orders/:id
pub async fn get_order(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match backend.orders.get(&subject, order_id).await {
        Ok(order) => Json(dto::order_to_json(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /orders/:id/retry
pub async fn retry_order(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match backend.orders.retry(&subject, order_id).await {
        Ok(order) => (StatusCode::ACCEPTED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
