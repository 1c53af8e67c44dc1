//! Common test utilities
//!
//! Database tests need `DATABASE_URL`; without it they return early. Every
//! test creates its own users and devices with unique emails, so tests can
//! share one database and run in parallel.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use jambo_backend::auth::hash_password;
use jambo_backend::{api, AppState, Config};

pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Connect and migrate, or `None` when no database is configured
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping database test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// Full application router backed by `pool`
pub fn test_app(pool: PgPool) -> Router {
    test_app_with(pool, |_| {})
}

/// Router with adjusted test configuration
pub fn test_app_with(pool: PgPool, configure: impl FnOnce(&mut Config)) -> Router {
    let mut config = Config::for_tests("postgres://unused");
    configure(&mut config);
    api::build_app(AppState::new(pool, config))
}

/// Random client address, so rate-limit buckets are not shared between tests
pub fn unique_client_ip() -> String {
    std::net::Ipv6Addr::from(Uuid::new_v4().as_u128()).to_string()
}

pub fn unique_email(prefix: &str) -> String {
    format!("{}-{}@example.com", prefix, Uuid::new_v4().simple())
}

/// Send a JSON request and decode the JSON response (`Null` for empty bodies)
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_with_headers(app, method, uri, token, body, &[]).await
}

/// `send` with extra request headers
pub async fn send_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Admin user with a VERIFIED device, inserted directly
pub struct SeededAdmin {
    pub user_id: Uuid,
    pub email: String,
    pub device_id: Uuid,
}

pub async fn seed_admin(pool: &PgPool) -> SeededAdmin {
    let email = unique_email("admin");
    let digest = hash_password(TEST_PASSWORD).unwrap();

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, password_hash, salt, name, role)
        VALUES ($1, $2, $3, 'Test Admin', 'admin')
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(&digest.hash)
    .bind(&digest.salt)
    .fetch_one(pool)
    .await
    .expect("Failed to seed admin user");

    let device_id: Uuid = sqlx::query_scalar(
        "INSERT INTO devices (user_id, device_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(format!("admin-device-{}", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .expect("Failed to seed admin device");

    sqlx::query(
        "INSERT INTO device_verifications (device_id, admin_id, status) VALUES ($1, $2, 'VERIFIED')",
    )
    .bind(device_id)
    .bind(user_id)
    .execute(pool)
    .await
    .expect("Failed to seed admin verification");

    SeededAdmin {
        user_id,
        email,
        device_id,
    }
}

/// Audit row written for the request carrying `correlation_id` as `x-request-id`
pub async fn audit_entry_for(pool: &PgPool, correlation_id: Uuid) -> Option<(String, Option<Uuid>, Value)> {
    sqlx::query_as(
        "SELECT action, user_id, meta FROM audit_logs WHERE meta->>'correlation_id' = $1",
    )
    .bind(correlation_id.to_string())
    .fetch_optional(pool)
    .await
    .unwrap()
}

/// Log in through the API, returning `(jwt, refresh_token)`
pub async fn login(app: &Router, email: &str, device_id: Uuid) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/api/users/login",
        None,
        Some(serde_json::json!({
            "email": email,
            "password": TEST_PASSWORD,
            "device_id": device_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);

    (
        body["jwt"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}
