use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use logiport_auth::Subject;
use logiport_core::ExportId;
use logiport_infra::Backend;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_export))
        .route("/:id", get(get_export))
        .route("/:id/download", get(download_export))
}

/// POST /exports
pub async fn create_export(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::CreateExportRequest>,
) -> axum::response::Response {
    match backend.exports.create(&subject, body.order_ids, body.note).await {
        Ok(export) => (StatusCode::ACCEPTED, Json(dto::export_to_json(&export))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /exports/:id
pub async fn get_export(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let export_id: ExportId = match errors::parse_id(&id, "export") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match backend.exports.get(&subject, export_id).await {
        Ok(export) => Json(dto::export_to_json(&export)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /exports/:id/download
pub async fn download_export(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let export_id: ExportId = match errors::parse_id(&id, "export") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match backend.exports.download(&subject, export_id).await {
        Ok(download) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", download.filename),
                ),
            ],
            download.bytes,
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
