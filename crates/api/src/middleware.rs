use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use logiport_auth::Subject;
use logiport_infra::features::Feature;
use logiport_infra::ratelimit::{Decision, EndpointClass, TokenBucketLimiter};
use logiport_infra::Backend;

use crate::app::errors;
use crate::context::subject_from_headers;

#[derive(Clone)]
pub struct GatewayState {
    pub backend: Arc<Backend>,
}

/// Resolve the gateway identity and refuse companies with `api_access` off.
pub async fn identity_middleware(
    State(state): State<GatewayState>,
    mut req: Request,
    next: Next,
) -> Response {
    let subject = match subject_from_headers(req.headers()) {
        Ok(subject) => subject,
        Err(e) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string()),
    };

    match state
        .backend
        .gate
        .is_enabled(subject.company_id, Feature::ApiAccess)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "feature_disabled",
                "api access is disabled for this company",
            );
        }
        Err(e) => return errors::service_error_to_response(e.into()),
    }

    req.extensions_mut().insert(subject);
    next.run(req).await
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: TokenBucketLimiter,
    pub class: EndpointClass,
}

/// Token-bucket admission per (subject, endpoint class). Runs inside
/// [`identity_middleware`].
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(subject) = req.extensions().get::<Subject>().cloned() else {
        return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "no identity");
    };

    match state.limiter.allow(&subject, state.class).await {
        Decision::Permit => next.run(req).await,
        Decision::Deny { retry_after } => {
            tracing::info!(
                subject_id = %subject.user_id,
                endpoint_class = %state.class,
                retry_after_secs = retry_after.as_secs(),
                "request throttled"
            );
            errors::rate_limited(
                format!("rate limit exceeded for {}", state.class),
                retry_after,
            )
        }
    }
}
