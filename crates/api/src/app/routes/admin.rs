//! Company-admin commands. Every handler requires the admin role; the
//! check lives in the command layer.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use logiport_auth::Subject;
use logiport_infra::features::Feature;
use logiport_infra::jobs::JobId;
use logiport_infra::services::REPEAT_OFFENDER_THRESHOLD;
use logiport_infra::Backend;

use crate::app::{dto, errors};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/orders/export", post(export_selected))
        .route("/orders/approve", post(approve_selected))
        .route("/orders/retry", post(retry_failed))
        .route("/orders/requeue", post(requeue_pending))
        .route("/users/block-repeat-offenders", post(block_repeat_offenders))
        .route("/features", get(list_features))
        .route("/features/:feature", put(set_feature))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/dead-letters", get(dead_letters))
        .route("/jobs/:id/redrive", post(redrive_job))
}

/// POST /admin/orders/export
pub async fn export_selected(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::SelectOrdersRequest>,
) -> axum::response::Response {
    match backend.admin.export_selected(&subject, body.order_ids).await {
        Ok(export) => (StatusCode::ACCEPTED, Json(dto::export_to_json(&export))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/orders/approve
pub async fn approve_selected(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::SelectOrdersRequest>,
) -> axum::response::Response {
    match backend.admin.approve_selected(&subject, &body.order_ids).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/orders/retry
pub async fn retry_failed(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::SelectOrdersRequest>,
) -> axum::response::Response {
    match backend.admin.retry_failed(&subject, &body.order_ids).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/orders/requeue
pub async fn requeue_pending(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
) -> axum::response::Response {
    match backend.admin.requeue_pending(&subject).await {
        Ok(requeued) => Json(serde_json::json!({ "requeued": requeued })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/users/block-repeat-offenders
pub async fn block_repeat_offenders(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Json(body): Json<dto::BlockOffendersRequest>,
) -> axum::response::Response {
    let threshold = body.threshold.unwrap_or(REPEAT_OFFENDER_THRESHOLD);
    match backend.admin.block_repeat_offenders(&subject, threshold).await {
        Ok(blocked) => Json(serde_json::json!({
            "blocked": blocked.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /admin/features
pub async fn list_features(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
) -> axum::response::Response {
    match backend.admin.features(&subject).await {
        Ok(toggles) => Json(toggles).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// PUT /admin/features/:feature
pub async fn set_feature(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(feature): Path<String>,
    Json(body): Json<dto::SetFeatureRequest>,
) -> axum::response::Response {
    let feature: Feature = match feature.parse() {
        Ok(feature) => feature,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_feature",
                "feature must be one of: bulk_orders, exports, csv_upload, api_access",
            );
        }
    };
    match backend.admin.set_feature(&subject, feature, body.enabled).await {
        Ok(toggles) => Json(toggles).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /admin/jobs/stats
pub async fn job_stats(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
) -> axum::response::Response {
    match backend.admin.job_stats(&subject).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// GET /admin/jobs/dead-letters?limit=20
pub async fn dead_letters(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Query(query): Query<dto::DeadLetterQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);
    match backend.admin.dead_letters(&subject, limit).await {
        Ok(entries) => Json(serde_json::json!({
            "dead_letters": entries.iter().map(dto::dead_letter_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// POST /admin/jobs/:id/redrive
pub async fn redrive_job(
    Extension(backend): Extension<Arc<Backend>>,
    Extension(subject): Extension<Subject>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_id(&id, "job") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match backend.admin.redrive(&subject, job_id).await {
        Ok(job) => (StatusCode::ACCEPTED, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
