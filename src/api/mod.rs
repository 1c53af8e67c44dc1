//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;

/// Create the `/api` router with its middleware stack.
///
/// Layers run outermost first: logging, request context, audit, rate
/// limiting, then bearer authentication on protected routes only. Audit sits
/// outside rate limiting so 429 responses are recorded too.
pub fn create_router(state: AppState) -> Router<AppState> {
    let protected = routes::protected_routes().route_layer(from_fn_with_state(
        state.clone(),
        middleware::auth_middleware,
    ));

    routes::public_routes()
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(from_fn_with_state(state, middleware::audit_middleware))
        .layer(from_fn(middleware::context_middleware))
        .layer(from_fn(middleware::logging_middleware))
}

/// Build the full application: health check, `/api`, CORS, request ids and tracing
pub fn build_app(state: AppState) -> Router {
    let request_id = HeaderName::from_static(middleware::REQUEST_ID_HEADER);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", create_router(state.clone()))
        .layer(cors)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// CORS policy from `CORS_ALLOWED_ORIGINS`; any origin is allowed outside
/// production when the list is empty or contains `*`.
fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(middleware::REQUEST_ID_HEADER)]);

    let wildcard = config.cors_allowed_origins.iter().any(|o| o == "*");
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if !config.is_production() && (wildcard || origins.is_empty()) {
        return base.allow_origin(Any);
    }

    if wildcard {
        tracing::warn!("Wildcard CORS origin is ignored in production");
    }
    base.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_health_check() {
        let app: Router = Router::new().route("/health", get(health_check));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_cors_layer_builds_for_each_environment() {
        let mut config = Config::for_tests("postgres://localhost/unused");
        let _ = cors_layer(&config);

        config.environment = "production".to_string();
        config.cors_allowed_origins = vec!["https://app.example.com".to_string(), "*".to_string()];
        let _ = cors_layer(&config);
    }
}
