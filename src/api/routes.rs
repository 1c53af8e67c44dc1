//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditLogEntry, AuditLogService};
use crate::domain::{Amount, DomainError, OperationContext, TransactionType, VerificationStatus};
use crate::error::AppError;
use crate::event_store::{EventFilter, EventStore, StoredEvent};
use crate::handlers::{
    require_admin, AccountView, BalanceHandler, CreateAccountCommand, CreateAccountHandler,
    CreateTransactionCommand, CreateTransactionHandler, CurrentUserHandler, DeviceView,
    GetVerificationHandler, ListAccountsHandler, ListDevicesHandler, ListTransactionsHandler,
    ListVerificationsHandler, LoginCommand, LoginHandler, RecordVerificationCommand,
    RecordVerificationHandler, RefreshCommand, RefreshHandler, RegisterDeviceCommand,
    RegisterDeviceHandler, RegisterUserCommand, RegisterUserHandler, TokenPair, TransactionView,
    UserView, VerificationView,
};
use crate::ledger::BalanceView;
use crate::state::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    #[serde(alias = "password_hash")]
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(alias = "password_hash")]
    pub password: String,
    /// Device record id
    pub device_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub user_id: Uuid,
    pub device_id: String,
    #[serde(default)]
    pub device_meta: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordVerificationRequest {
    pub device_id: Uuid,
    pub status: VerificationStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationsQuery {
    #[serde(default)]
    pub status: Option<VerificationStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Amount,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub aggregate_type: Option<String>,
    #[serde(default)]
    pub aggregate_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogsQuery {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct EventsListResponse {
    pub events: Vec<StoredEvent>,
    pub total: i64,
}

/// Decode an optional JSON body: empty means defaults, anything else must parse
fn parse_optional_body<T>(body: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body)
        .map_err(|e| DomainError::Validation(format!("Invalid request body: {}", e)).into())
}

// =========================================================================
// API Routers
// =========================================================================

/// Routes reachable without an access token
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Users
        .route("/users", post(register_user))
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh_token))
        // Devices
        .route("/devices", post(register_device))
        // Verification status polled by the "device not approved" screen
        .route("/device-verifications/:device_id", get(get_verification))
}

/// Routes behind bearer authentication
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(current_user))
        .route("/users/me/devices", get(list_my_devices))
        // Admin: device approval
        .route(
            "/device-verifications",
            post(record_verification).get(list_verifications),
        )
        // Accounts
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:account_id/balance", get(get_balance))
        // Transactions
        .route(
            "/accounts/:account_id/transactions",
            post(create_transaction).get(list_transactions),
        )
        // Admin: logs
        .route("/audit-logs", get(list_audit_logs))
        .route("/events", get(list_events))
}

// =========================================================================
// Users
// =========================================================================

/// POST /users
async fn register_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let handler = RegisterUserHandler::new(state.pool);

    let command = RegisterUserCommand::new(request.email, request.password);
    let command = match request.name {
        Some(name) => command.with_name(name),
        None => command,
    };

    let user = handler.execute(command, &context).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /users/login
async fn login(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let handler = LoginHandler::new(
        state.pool,
        state.tokens,
        state.config.refresh_token_ttl_days,
    );

    let command = LoginCommand::new(request.email, request.password, request.device_id);
    Ok(Json(handler.execute(command, &context).await?))
}

/// POST /users/refresh-token
async fn refresh_token(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let handler = RefreshHandler::new(
        state.pool,
        state.tokens,
        state.config.refresh_token_ttl_days,
    );

    let command = RefreshCommand {
        refresh_token: request.refresh_token,
    };
    Ok(Json(handler.execute(command, &context).await?))
}

/// GET /users/me
async fn current_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<UserView>, AppError> {
    Ok(Json(CurrentUserHandler::new(state.pool).execute(&context).await?))
}

// =========================================================================
// Devices
// =========================================================================

/// POST /devices
async fn register_device(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceView>), AppError> {
    let mut command = RegisterDeviceCommand::new(request.user_id, request.device_id);
    if let Some(meta) = request.device_meta {
        command = command.with_meta(meta);
    }
    if let Some(created_by) = request.created_by {
        command = command.with_created_by(created_by);
    }

    let device = RegisterDeviceHandler::new(state.pool)
        .execute(command, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// GET /users/me/devices
async fn list_my_devices(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<Vec<DeviceView>>, AppError> {
    Ok(Json(ListDevicesHandler::new(state.pool).execute(&context).await?))
}

// =========================================================================
// Device verifications
// =========================================================================

/// POST /device-verifications (admin)
async fn record_verification(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<RecordVerificationRequest>,
) -> Result<(StatusCode, Json<VerificationView>), AppError> {
    let mut command = RecordVerificationCommand::new(request.device_id, request.status);
    if let Some(note) = request.note {
        command = command.with_note(note);
    }

    let verification = RecordVerificationHandler::new(state.pool)
        .execute(command, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(verification)))
}

/// GET /device-verifications/:device_id
async fn get_verification(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> Result<Json<VerificationView>, AppError> {
    Ok(Json(GetVerificationHandler::new(state.pool).execute(device_id).await?))
}

/// GET /device-verifications?status= (admin)
async fn list_verifications(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<VerificationsQuery>,
) -> Result<Json<Vec<VerificationView>>, AppError> {
    let verifications = ListVerificationsHandler::new(state.pool)
        .execute(query.status, &context)
        .await?;
    Ok(Json(verifications))
}

// =========================================================================
// Accounts
// =========================================================================

/// POST /accounts
async fn create_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<AccountView>), AppError> {
    let request = parse_optional_body::<CreateAccountRequest>(&body)?;
    let command = CreateAccountCommand {
        currency: request.currency,
    };

    let account = CreateAccountHandler::new(state.pool)
        .execute(command, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts
async fn list_accounts(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<Vec<AccountView>>, AppError> {
    Ok(Json(ListAccountsHandler::new(state.pool).execute(&context).await?))
}

/// GET /accounts/:account_id/balance
async fn get_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceView>, AppError> {
    let balance = BalanceHandler::new(state.pool)
        .execute(account_id, &context)
        .await?;
    Ok(Json(balance))
}

// =========================================================================
// Transactions
// =========================================================================

/// POST /accounts/:account_id/transactions
async fn create_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionView>), AppError> {
    let mut command = CreateTransactionCommand::new(account_id, request.kind, request.amount);
    if let Some(reference) = request.reference {
        command = command.with_reference(reference);
    }
    command.meta = request.meta;

    let handler = CreateTransactionHandler::new(state.pool, state.config.snapshot_threshold);
    let transaction = handler.execute(command, &context).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /accounts/:account_id/transactions?all=true
async fn list_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let transactions = ListTransactionsHandler::new(state.pool)
        .execute(account_id, query.all, &context)
        .await?;
    Ok(Json(transactions))
}

// =========================================================================
// Admin: audit logs and events
// =========================================================================

/// GET /audit-logs (admin)
async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<AuditLogsQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    require_admin(&context)?;

    let entries = AuditLogService::new(state.pool)
        .list(query.user_id, query.limit, query.offset)
        .await?;
    Ok(Json(entries))
}

/// GET /events (admin)
async fn list_events(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsListResponse>, AppError> {
    require_admin(&context)?;

    let filter = EventFilter {
        aggregate_type: query.aggregate_type,
        aggregate_id: query.aggregate_id,
        limit: query.limit,
        offset: query.offset,
    };
    let (events, total) = EventStore::new(state.pool).list(&filter).await?;

    Ok(Json(EventsListResponse { events, total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_accepts_password_hash_alias() {
        let request: RegisterUserRequest = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password_hash": "hunter22hunter22",
        }))
        .unwrap();
        assert_eq!(request.password, "hunter22hunter22");
        assert!(request.name.is_none());
    }

    #[test]
    fn test_login_request_requires_uuid_device() {
        let ok: Result<LoginRequest, _> = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password": "hunter22hunter22",
            "device_id": Uuid::new_v4(),
        }));
        assert!(ok.is_ok());

        let bad: Result<LoginRequest, _> = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password": "hunter22hunter22",
            "device_id": "my-phone",
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_transaction_request_parsing() {
        let request: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "type": "DEPOSIT",
            "amount": 150,
            "reference": "cash",
        }))
        .unwrap();
        assert_eq!(request.kind, TransactionType::Deposit);
        assert_eq!(request.amount.to_string(), "150.00");

        let lowercase: Result<CreateTransactionRequest, _> =
            serde_json::from_value(serde_json::json!({ "type": "deposit", "amount": 1 }));
        assert!(lowercase.is_err());
    }

    #[test]
    fn test_verification_request_parsing() {
        let request: RecordVerificationRequest = serde_json::from_value(serde_json::json!({
            "device_id": Uuid::new_v4(),
            "status": "VERIFIED",
        }))
        .unwrap();
        assert_eq!(request.status, VerificationStatus::Verified);
        assert!(request.note.is_none());
    }

    #[test]
    fn test_optional_body_defaults_only_when_empty() {
        let empty: CreateAccountRequest = parse_optional_body(b"").unwrap();
        assert!(empty.currency.is_none());

        let blank: CreateAccountRequest = parse_optional_body(b" \n").unwrap();
        assert!(blank.currency.is_none());

        let usd: CreateAccountRequest = parse_optional_body(br#"{"currency":"USD"}"#).unwrap();
        assert_eq!(usd.currency.as_deref(), Some("USD"));

        let wrong_type = parse_optional_body::<CreateAccountRequest>(br#"{"currency":5}"#);
        assert!(matches!(
            wrong_type,
            Err(AppError::Domain(DomainError::Validation(_)))
        ));

        let truncated = parse_optional_body::<CreateAccountRequest>(br#"{"currency":"USD""#);
        assert_eq!(
            truncated.unwrap_err().status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_events_query_defaults() {
        let query: EventsQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
        assert!(query.aggregate_type.is_none());
    }
}
