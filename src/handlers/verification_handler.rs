//! Device Verification Handlers
//!
//! Verification records are append-only decisions. A device's current status
//! is its newest record.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, DomainEvent, OperationContext, VerificationStatus};
use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;

use super::{require_admin, RecordVerificationCommand, VerificationView};

#[derive(Debug, FromRow)]
pub(super) struct VerificationRow {
    id: Uuid,
    device_id: Uuid,
    admin_id: Option<Uuid>,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for VerificationView {
    type Error = DomainError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        Ok(VerificationView {
            id: row.id,
            device_id: row.device_id,
            admin_id: row.admin_id,
            status: row.status.parse()?,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

/// Insert a verification record on the given connection
pub(super) async fn insert_verification(
    conn: &mut PgConnection,
    device_id: Uuid,
    admin_id: Option<Uuid>,
    status: VerificationStatus,
    note: Option<&str>,
) -> AppResult<VerificationView> {
    let row = sqlx::query_as::<_, VerificationRow>(
        r#"
        INSERT INTO device_verifications (device_id, admin_id, status, note)
        VALUES ($1, $2, $3, $4)
        RETURNING id, device_id, admin_id, status, note, created_at
        "#,
    )
    .bind(device_id)
    .bind(admin_id)
    .bind(status.as_str())
    .bind(note)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.try_into()?)
}

/// Newest verification record of a device
async fn latest_verification(
    conn: &mut PgConnection,
    device_id: Uuid,
) -> AppResult<Option<VerificationView>> {
    let row = sqlx::query_as::<_, VerificationRow>(
        r#"
        SELECT id, device_id, admin_id, status, note, created_at
        FROM device_verifications
        WHERE device_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(device_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(VerificationView::try_from)
        .transpose()
        .map_err(AppError::from)
}

/// Current status of a device, `None` if it has never been reviewed
pub(crate) async fn latest_status(
    conn: &mut PgConnection,
    device_id: Uuid,
) -> AppResult<Option<VerificationStatus>> {
    Ok(latest_verification(conn, device_id).await?.map(|v| v.status))
}

// =========================================================================
// RecordVerificationHandler
// =========================================================================

/// Handler for admin approval decisions
pub struct RecordVerificationHandler {
    pool: PgPool,
}

impl RecordVerificationHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(
        &self,
        command: RecordVerificationCommand,
        context: &OperationContext,
    ) -> AppResult<VerificationView> {
        let admin_id = require_admin(context)?;
        let note = command
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let mut tx = self.pool.begin().await?;

        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM devices WHERE id = $1")
            .bind(command.device_id)
            .fetch_optional(&mut *tx)
            .await?;
        let owner =
            owner.ok_or_else(|| DomainError::DeviceNotFound(command.device_id.to_string()))?;

        let verification = insert_verification(
            &mut tx,
            command.device_id,
            Some(admin_id),
            command.status,
            note,
        )
        .await?;

        let event = DomainEvent::DeviceVerificationRecorded {
            device_id: command.device_id,
            admin_id,
            status: command.status,
            note: verification.note.clone(),
        };
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::DeviceVerificationRecorded)
                .user_id(Some(owner))
                .admin_id(admin_id)
                .meta(&serde_json::json!({
                    "device_id": command.device_id,
                    "status": command.status,
                    "note": verification.note,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            device_id = %command.device_id,
            admin_id = %admin_id,
            status = %command.status,
            "Device verification recorded"
        );

        Ok(verification)
    }
}

// =========================================================================
// Queries
// =========================================================================

/// Handler for the public status lookup
pub struct GetVerificationHandler {
    pool: PgPool,
}

impl GetVerificationHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, device_id: Uuid) -> AppResult<VerificationView> {
        let mut conn = self.pool.acquire().await?;
        latest_verification(&mut conn, device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Verification for device {}", device_id)))
    }
}

/// Handler for the admin approval queue
pub struct ListVerificationsHandler {
    pool: PgPool,
}

impl ListVerificationsHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Latest record per device, optionally filtered by status, oldest first
    pub async fn execute(
        &self,
        status: Option<VerificationStatus>,
        context: &OperationContext,
    ) -> AppResult<Vec<VerificationView>> {
        require_admin(context)?;

        let rows = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT id, device_id, admin_id, status, note, created_at
            FROM (
                SELECT DISTINCT ON (device_id)
                    id, device_id, admin_id, status, note, created_at
                FROM device_verifications
                ORDER BY device_id, created_at DESC, id DESC
            ) latest
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| VerificationView::try_from(row).map_err(AppError::from))
            .collect()
    }
}
