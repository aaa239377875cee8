//! HTTP application wiring (axum router over the command services).
//!
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use logiport_infra::ratelimit::EndpointClass;
use logiport_infra::Backend;

use crate::middleware::{self, GatewayState, RateLimitState};

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(backend: Arc<Backend>) -> Router {
    let limited = |router: Router, class: EndpointClass| {
        router.layer(axum::middleware::from_fn_with_state(
            RateLimitState {
                limiter: backend.limiter.clone(),
                class,
            },
            middleware::rate_limit_middleware,
        ))
    };

    let routes = routes::routers();
    // Identity runs first, then the per-class limiter, then the handler.
    let protected = Router::new()
        .route("/whoami", get(routes::system::whoami))
        .merge(limited(routes.products, EndpointClass::Products))
        .merge(limited(routes.orders, EndpointClass::Orders))
        .merge(limited(routes.exports, EndpointClass::Exports))
        .merge(limited(routes.admin, EndpointClass::Orders))
        .layer(Extension(backend.clone()))
        .layer(axum::middleware::from_fn_with_state(
            GatewayState {
                backend: backend.clone(),
            },
            middleware::identity_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use logiport_core::{CompanyId, UserId};
    use logiport_infra::{AppConfig, Components};
    use logiport_orders::{FixedApproval, LatencyRange};

    use super::*;
    use crate::context::{COMPANY_ID_HEADER, ROLE_HEADER, USER_ID_HEADER};

    fn app() -> Router {
        let backend = Backend::assemble(
            Components::in_memory(Arc::new(FixedApproval(true)), LatencyRange::none()),
            &AppConfig::default(),
        );
        build_app(Arc::new(backend))
    }

    #[tokio::test]
    async fn health_skips_identity() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_gateway_identity() {
        let response = app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(USER_ID_HEADER, UserId::new().to_string())
                    .header(COMPANY_ID_HEADER, CompanyId::new().to_string())
                    .header(ROLE_HEADER, "operator")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
