//! User Handlers
//!
//! Registration, login, refresh-token rotation and the current user lookup.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::auth::{self, TokenIssuer};
use crate::db;
use crate::domain::{DomainError, DomainEvent, OperationContext, Role};
use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;

use super::verification_handler::latest_status;
use super::{
    normalize_email, validate_password, LoginCommand, RefreshCommand, RegisterUserCommand,
    TokenPair, UserView,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid or expired refresh token";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserView {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserView {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

async fn find_user_by_email(conn: &mut PgConnection, email: &str) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, name, role, created_at FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

async fn find_user_by_id(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<UserRow>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, name, role, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Fail unless the device belongs to the user and its latest verification is VERIFIED
async fn ensure_device_verified(
    conn: &mut PgConnection,
    user_id: Uuid,
    device_id: Uuid,
) -> AppResult<()> {
    let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM devices WHERE id = $1")
        .bind(device_id)
        .fetch_optional(&mut *conn)
        .await?;

    if owner != Some(user_id) {
        return Err(DomainError::DeviceNotVerified.into());
    }

    match latest_status(conn, device_id).await? {
        Some(status) if status.allows_login() => Ok(()),
        _ => Err(DomainError::DeviceNotVerified.into()),
    }
}

/// Issue an access token and persist a fresh refresh token
async fn issue_token_pair(
    conn: &mut PgConnection,
    tokens: &TokenIssuer,
    refresh_ttl_days: i64,
    user: &UserRow,
    role: Role,
    device_id: Uuid,
) -> AppResult<TokenPair> {
    let jwt = tokens.issue(user.id, &user.email, role, device_id)?;
    let refresh = auth::generate_refresh_token(refresh_ttl_days);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, device_id, token_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user.id)
    .bind(device_id.to_string())
    .bind(&refresh.token_hash)
    .bind(refresh.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(TokenPair {
        jwt,
        refresh_token: refresh.token,
    })
}

// =========================================================================
// RegisterUserHandler
// =========================================================================

/// Handler for user registration
pub struct RegisterUserHandler {
    pool: PgPool,
}

impl RegisterUserHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute the register command
    pub async fn execute(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> AppResult<UserView> {
        let email = normalize_email(&command.email)?;
        validate_password(&command.password)?;
        let name = command
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let digest = auth::hash_password(&command.password)?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, salt, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, password_hash, name, role, created_at
            "#,
        )
        .bind(&email)
        .bind(&digest.hash)
        .bind(&digest.salt)
        .bind(&name)
        .bind(Role::Client.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                AppError::Domain(DomainError::AlreadyExists("User with this email".to_string()))
            } else {
                AppError::Database(e)
            }
        })?;

        let event = DomainEvent::UserRegistered {
            user_id: row.id,
            email: row.email.clone(),
            name: row.name.clone(),
        };
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::UserRegistered)
                .user_id(Some(row.id))
                .meta(&serde_json::json!({
                    "email": row.email,
                    "correlation_id": context.correlation_id,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %row.id, "User registered");

        Ok(row.try_into()?)
    }
}

// =========================================================================
// LoginHandler
// =========================================================================

/// Handler for password login from a verified device
pub struct LoginHandler {
    pool: PgPool,
    tokens: TokenIssuer,
    refresh_ttl_days: i64,
    audit: AuditLogService,
}

impl LoginHandler {
    pub fn new(pool: PgPool, tokens: TokenIssuer, refresh_ttl_days: i64) -> Self {
        Self {
            audit: AuditLogService::new(pool.clone()),
            pool,
            tokens,
            refresh_ttl_days,
        }
    }

    /// Execute the login command
    pub async fn execute(
        &self,
        command: LoginCommand,
        context: &OperationContext,
    ) -> AppResult<TokenPair> {
        let email = command.email.trim().to_lowercase();

        let mut tx = self.pool.begin().await?;

        let user = match find_user_by_email(&mut tx, &email).await? {
            Some(user) if auth::verify_password(&command.password, &user.password_hash) => user,
            found => {
                tx.rollback().await?;
                self.record_failure(found.map(|u| u.id), &email, context).await;
                return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
            }
        };

        let role: Role = user.role.parse()?;

        ensure_device_verified(&mut tx, user.id, command.device_id).await?;

        let pair = issue_token_pair(
            &mut tx,
            &self.tokens,
            self.refresh_ttl_days,
            &user,
            role,
            command.device_id,
        )
        .await?;

        let event = DomainEvent::UserLoggedIn {
            user_id: user.id,
            device_id: command.device_id,
        };
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::LoginSucceeded)
                .user_id(Some(user.id))
                .meta(&serde_json::json!({
                    "device_id": command.device_id,
                    "client_ip": context.client_ip,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, device_id = %command.device_id, "User logged in");

        Ok(pair)
    }

    /// Failed attempts are audited best-effort
    async fn record_failure(&self, user_id: Option<Uuid>, email: &str, context: &OperationContext) {
        let entry = AuditLogBuilder::new(AuditAction::LoginFailed)
            .user_id(user_id)
            .meta(&serde_json::json!({
                "email": email,
                "client_ip": context.client_ip,
            }));

        if let Err(e) = self.audit.log(entry).await {
            tracing::warn!(error = %e, "Failed to audit login failure");
        }
    }
}

// =========================================================================
// RefreshHandler
// =========================================================================

/// Handler for single-use refresh token rotation
pub struct RefreshHandler {
    pool: PgPool,
    tokens: TokenIssuer,
    refresh_ttl_days: i64,
}

impl RefreshHandler {
    pub fn new(pool: PgPool, tokens: TokenIssuer, refresh_ttl_days: i64) -> Self {
        Self {
            pool,
            tokens,
            refresh_ttl_days,
        }
    }

    /// Revoke the presented token and issue a new pair
    pub async fn execute(
        &self,
        command: RefreshCommand,
        _context: &OperationContext,
    ) -> AppResult<TokenPair> {
        let token_hash = auth::hash_refresh_token(command.refresh_token.trim());

        let mut tx = self.pool.begin().await?;

        // Conditional update: of two concurrent refreshes only one sees a row
        let consumed: Option<(Uuid, String)> = sqlx::query_as(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id, device_id
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, device_id)) = consumed else {
            return Err(AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()));
        };

        let device_id: Uuid = device_id
            .parse()
            .map_err(|_| AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()))?;

        let user = find_user_by_id(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()))?;
        let role: Role = user.role.parse()?;

        ensure_device_verified(&mut tx, user.id, device_id).await?;

        let pair = issue_token_pair(
            &mut tx,
            &self.tokens,
            self.refresh_ttl_days,
            &user,
            role,
            device_id,
        )
        .await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::TokenRefreshed)
                .user_id(Some(user.id))
                .meta(&serde_json::json!({ "device_id": device_id })),
        )
        .await?;

        tx.commit().await?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");

        Ok(pair)
    }
}

// =========================================================================
// CurrentUserHandler
// =========================================================================

/// Handler returning the authenticated user
pub struct CurrentUserHandler {
    pool: PgPool,
}

impl CurrentUserHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, context: &OperationContext) -> AppResult<UserView> {
        let user_id = super::require_user(context)?;

        let mut conn = self.pool.acquire().await?;
        let row = find_user_by_id(&mut conn, user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))?;

        Ok(row.try_into()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_row_conversion_hides_secrets() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            name: Some("Alice".to_string()),
            role: "admin".to_string(),
            created_at: Utc::now(),
        };

        let view: UserView = row.try_into().unwrap();
        assert_eq!(view.role, Role::Admin);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("salt").is_none());
        assert_eq!(json["role"], "admin");
    }

    #[test]
    fn test_user_row_with_unknown_role_is_rejected() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "bob@example.com".to_string(),
            password_hash: String::new(),
            name: None,
            role: "superuser".to_string(),
            created_at: Utc::now(),
        };

        let result: Result<UserView, _> = row.try_into();
        assert!(matches!(result, Err(DomainError::InvalidValue(_))));
    }
}
