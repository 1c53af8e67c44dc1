//! Device Handlers
//!
//! Devices are registered before the first login and stay unusable until an
//! admin verifies them.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::db;
use crate::domain::{DomainError, DomainEvent, OperationContext, VerificationStatus};
use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;

use super::verification_handler::insert_verification;
use super::{require_user, validate_device_id, DeviceView, RegisterDeviceCommand};

#[derive(Debug, FromRow)]
struct DeviceRow {
    id: Uuid,
    user_id: Uuid,
    device_id: String,
    device_meta: Option<serde_json::Value>,
    registered_at: DateTime<Utc>,
    created_by: Option<String>,
    status: Option<String>,
}

impl TryFrom<DeviceRow> for DeviceView {
    type Error = DomainError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(DeviceView {
            id: row.id,
            user_id: row.user_id,
            device_id: row.device_id,
            device_meta: row.device_meta,
            registered_at: row.registered_at,
            created_by: row.created_by,
            status: row
                .status
                .as_deref()
                .map(str::parse::<VerificationStatus>)
                .transpose()?,
        })
    }
}

// =========================================================================
// RegisterDeviceHandler
// =========================================================================

/// Handler for device registration
pub struct RegisterDeviceHandler {
    pool: PgPool,
}

impl RegisterDeviceHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register the device and queue it for admin review
    pub async fn execute(
        &self,
        command: RegisterDeviceCommand,
        context: &OperationContext,
    ) -> AppResult<DeviceView> {
        let device_id = validate_device_id(&command.device_id)?;

        let mut tx = self.pool.begin().await?;

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(command.user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(DomainError::UserNotFound(command.user_id.to_string()).into());
        }

        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            INSERT INTO devices (user_id, device_id, device_meta, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, device_id, device_meta, registered_at, created_by,
                      NULL::text AS status
            "#,
        )
        .bind(command.user_id)
        .bind(&device_id)
        .bind(&command.device_meta)
        .bind(&command.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                AppError::Conflict(format!("Device '{}' is already registered", device_id))
            } else {
                AppError::Database(e)
            }
        })?;

        let pending =
            insert_verification(&mut tx, row.id, None, VerificationStatus::Pending, None).await?;

        let event = DomainEvent::DeviceRegistered {
            id: row.id,
            device_id: row.device_id.clone(),
            user_id: row.user_id,
        };
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::DeviceRegistered)
                .user_id(Some(row.user_id))
                .meta(&serde_json::json!({
                    "device_record_id": row.id,
                    "device_id": row.device_id,
                    "client_ip": context.client_ip,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %row.user_id, device_record_id = %row.id, "Device registered");

        let mut view: DeviceView = row.try_into()?;
        view.status = Some(pending.status);
        Ok(view)
    }
}

// =========================================================================
// ListDevicesHandler
// =========================================================================

/// Handler listing the caller's devices with their current status
pub struct ListDevicesHandler {
    pool: PgPool,
}

impl ListDevicesHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, context: &OperationContext) -> AppResult<Vec<DeviceView>> {
        let user_id = require_user(context)?;

        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT d.id, d.user_id, d.device_id, d.device_meta, d.registered_at, d.created_by,
                   v.status
            FROM devices d
            LEFT JOIN LATERAL (
                SELECT status
                FROM device_verifications
                WHERE device_id = d.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) v ON TRUE
            WHERE d.user_id = $1
            ORDER BY d.registered_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| DeviceView::try_from(row).map_err(AppError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: Option<&str>) -> DeviceRow {
        DeviceRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            device_id: "pixel-7".to_string(),
            device_meta: Some(serde_json::json!({ "os": "android" })),
            registered_at: Utc::now(),
            created_by: None,
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_device_row_conversion() {
        let view: DeviceView = row(Some("VERIFIED")).try_into().unwrap();
        assert_eq!(view.status, Some(VerificationStatus::Verified));
        assert_eq!(view.device_meta.unwrap()["os"], "android");

        let view: DeviceView = row(None).try_into().unwrap();
        assert!(view.status.is_none());
    }

    #[test]
    fn test_device_row_bad_status() {
        assert!(DeviceView::try_from(row(Some("MAYBE"))).is_err());
    }
}
