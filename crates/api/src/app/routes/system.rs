use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use logiport_auth::Subject;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(subject): Extension<Subject>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": subject.user_id.to_string(),
        "company_id": subject.company_id.to_string(),
        "role": subject.role.to_string(),
    }))
}
