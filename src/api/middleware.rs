//! API Middleware
//!
//! Request context, bearer authentication, rate limiting, request logging and
//! HTTP audit logging.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, OriginalUri, State},
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditLogBuilder, AuditLogService};
use crate::domain::{OperationContext, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the request id set by the request-id layer
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticated caller, decoded from the access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub device_id: Uuid,
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

/// Client address: first `X-Forwarded-For` entry, else the socket peer
pub fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

// =========================================================================
// Request context
// =========================================================================

/// Attach an `OperationContext` with correlation id and client address
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let mut context = OperationContext::new();
    if let Some(id) = correlation_id(request.headers()) {
        context = context.with_correlation_id(id);
    }
    context.ensure_correlation_id();
    if let Some(ip) = client_ip(&request) {
        context = context.with_client_ip(ip);
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

// =========================================================================
// Bearer authentication
// =========================================================================

/// Validate `Authorization: Bearer <jwt>` and attach the caller
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        Some(token) => token.trim().to_string(),
        None => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing bearer token",
                "missing_token",
            ));
        }
    };

    let claims = match state.tokens.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected access token");
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token",
                "invalid_token",
            ));
        }
    };

    let user = AuthenticatedUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        device_id: claims.device_id,
    };

    let context = request
        .extensions_mut()
        .remove::<OperationContext>()
        .unwrap_or_default()
        .with_user(user.id, user.role)
        .with_device(user.device_id);

    request.extensions_mut().insert(context);
    request.extensions_mut().insert(user.clone());

    let mut response = next.run(request).await;
    // Outer layers (audit) only see the response
    response.extensions_mut().insert(user);
    Ok(response)
}

// =========================================================================
// Rate limiting
// =========================================================================

/// Fixed one-minute window per client address
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let key = client_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let count: i32 = match sqlx::query_scalar(
        r#"
        INSERT INTO rate_limit_buckets (bucket_key, window_start, request_count)
        VALUES ($1, date_trunc('minute', NOW()), 1)
        ON CONFLICT (bucket_key, window_start)
        DO UPDATE SET request_count = rate_limit_buckets.request_count + 1
        RETURNING request_count
        "#,
    )
    .bind(&key)
    .fetch_one(&state.pool)
    .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Rate limit check error: {}", e);
            return Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Rate limit check failed",
                "database_error",
            ));
        }
    };

    if count > state.config.rate_limit_per_minute {
        tracing::warn!(client = %key, count, "Rate limit exceeded");
        return Err(AppError::RateLimitExceeded.into_response());
    }

    Ok(next.run(request).await)
}

// =========================================================================
// Request logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.clone())
        .unwrap_or_else(|| request.uri().clone());
    let version = request.version();
    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = correlation_id(request.headers());

    let start = Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

// =========================================================================
// HTTP audit
// =========================================================================

/// Audit action for a request: method plus path and query
pub fn audit_action(method: &Method, uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{} {}", method, target)
}

/// Record `"{METHOD} {path}?{query}"` with the response status for every API call
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Nested routers see the path without the `/api` prefix
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.clone())
        .unwrap_or_else(|| request.uri().clone());
    let action = audit_action(request.method(), &uri);
    let correlation_id = correlation_id(request.headers());
    let start = Instant::now();

    let response = next.run(request).await;

    let user_id = response
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.id);

    let entry = AuditLogBuilder::custom(&action)
        .user_id(user_id)
        .meta(&json!({
            "status_code": response.status().as_u16(),
            "correlation_id": correlation_id,
            "duration_ms": start.elapsed().as_millis() as u64,
        }));

    if let Err(e) = AuditLogService::new(state.pool.clone()).log(entry).await {
        tracing::warn!(action = %action, error = %e, "Failed to write audit log");
    }

    response
}
