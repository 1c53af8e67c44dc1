//! Audit Log Service
//!
//! Append-only record of who did what. Every HTTP response is recorded by the
//! audit middleware; privileged operations add their own entries with the
//! acting admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// Maximum page size for audit listings
const MAX_PAGE: i64 = 1000;

/// Audit log entry as stored
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub admin_id: Option<Uuid>,
    pub action: String,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegistered,
    LoginSucceeded,
    LoginFailed,
    TokenRefreshed,
    DeviceRegistered,
    DeviceVerificationRecorded,
    AccountOpened,
    TransactionCreated,
    WithdrawalRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user.registered",
            AuditAction::LoginSucceeded => "auth.login_succeeded",
            AuditAction::LoginFailed => "auth.login_failed",
            AuditAction::TokenRefreshed => "auth.token_refreshed",
            AuditAction::DeviceRegistered => "device.registered",
            AuditAction::DeviceVerificationRecorded => "device.verification_recorded",
            AuditAction::AccountOpened => "account.opened",
            AuditAction::TransactionCreated => "transaction.created",
            AuditAction::WithdrawalRejected => "transaction.withdrawal_rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    user_id: Option<Uuid>,
    admin_id: Option<Uuid>,
    meta: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder
    pub fn new(action: AuditAction) -> Self {
        Self::custom(action.as_str())
    }

    /// Create with custom action string (e.g. `"POST /api/users"`)
    pub fn custom(action: &str) -> Self {
        Self {
            action: action.to_string(),
            user_id: None,
            admin_id: None,
            meta: None,
        }
    }

    /// Set the subject user
    pub fn user_id(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the acting admin
    pub fn admin_id(mut self, admin_id: Uuid) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    /// Attach structured metadata
    pub fn meta<T: Serialize>(mut self, meta: &T) -> Self {
        self.meta = serde_json::to_value(meta).ok();
        self
    }
}

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    /// Create a new AuditLogService
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write an audit log entry
    pub async fn log(&self, builder: AuditLogBuilder) -> Result<i64, AuditLogError> {
        let mut conn = self.pool.acquire().await?;
        Self::log_with(&mut conn, builder).await
    }

    /// Write an audit log entry on the given connection (usually an open transaction)
    pub async fn log_with(
        conn: &mut PgConnection,
        builder: AuditLogBuilder,
    ) -> Result<i64, AuditLogError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (user_id, admin_id, action, meta)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(builder.user_id)
        .bind(builder.admin_id)
        .bind(&builder.action)
        .bind(&builder.meta)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!(
            audit_id = id,
            action = %builder.action,
            "Audit log entry created"
        );

        Ok(id)
    }

    /// Recent audit logs, optionally restricted to a user (as subject or admin)
    pub async fn list(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, user_id, admin_id, action, meta, created_at
            FROM audit_logs
            WHERE ($1::uuid IS NULL OR user_id = $1 OR admin_id = $1)
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, MAX_PAGE))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::UserRegistered.as_str(), "user.registered");
        assert_eq!(
            AuditAction::DeviceVerificationRecorded.as_str(),
            "device.verification_recorded"
        );
        assert_eq!(AuditAction::LoginFailed.to_string(), "auth.login_failed");
    }

    #[test]
    fn test_audit_log_builder() {
        let admin = Uuid::new_v4();
        let user = Uuid::new_v4();
        let builder = AuditLogBuilder::new(AuditAction::DeviceVerificationRecorded)
            .user_id(Some(user))
            .admin_id(admin)
            .meta(&serde_json::json!({ "status": "VERIFIED" }));

        assert_eq!(builder.action, "device.verification_recorded");
        assert_eq!(builder.user_id, Some(user));
        assert_eq!(builder.admin_id, Some(admin));
        assert_eq!(builder.meta.unwrap()["status"], "VERIFIED");
    }

    #[test]
    fn test_custom_action() {
        let builder = AuditLogBuilder::custom("GET /api/accounts");
        assert_eq!(builder.action, "GET /api/accounts");
        assert!(builder.user_id.is_none());
    }
}
