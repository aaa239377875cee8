use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use logiport_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ServiceError::Unauthorized(msg) => json_error(StatusCode::FORBIDDEN, "unauthorized", msg),
        e @ ServiceError::FeatureDisabled(_) => {
            json_error(StatusCode::FORBIDDEN, "feature_disabled", e.to_string())
        }
        ServiceError::Exhausted {
            reason,
            retry_after: Some(retry_after),
        } => rate_limited(reason, retry_after),
        ServiceError::Exhausted {
            reason,
            retry_after: None,
        } => json_error(StatusCode::UNPROCESSABLE_ENTITY, "resource_exhausted", reason),
        ServiceError::Transient(msg) => {
            tracing::warn!(error = %msg, "request failed on unavailable infrastructure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg)
        }
        ServiceError::Invariant(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
    }
}

/// 429 with a `Retry-After` header in whole seconds.
pub fn rate_limited(reason: impl Into<String>, retry_after: Duration) -> Response {
    let secs = retry_after.as_secs().max(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(json!({
            "error": "rate_limited",
            "message": reason.into(),
            "retry_after": secs,
        })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    response
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Path ids arrive as strings so a bad id gets the JSON error shape.
pub fn parse_id<T: std::str::FromStr>(raw: &str, what: &'static str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
