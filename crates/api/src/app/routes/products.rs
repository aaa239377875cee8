use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};

use logiport_auth::Subject;
use logiport_infra::Backend;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(list_products))
}

pub async fn list_products(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
) -> axum::response::Response {
    match backend.orders.catalog(&subject).await {
        Ok(products) => Json(serde_json::json!({
            "products": products.iter().map(dto::product_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
