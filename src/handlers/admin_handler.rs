//! Admin Bootstrap Handler
//!
//! Creates or promotes an admin and gives it a VERIFIED device, so the first
//! admin can log in before anyone exists to approve devices.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth;
use crate::domain::{DomainEvent, VerificationStatus};
use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;

use super::verification_handler::insert_verification;
use super::{normalize_email, validate_device_id, validate_password};

const BOOTSTRAP_NOTE: &str = "Bootstrap admin device";

/// Command to bootstrap an admin
#[derive(Debug, Clone)]
pub struct BootstrapAdminCommand {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

/// Outcome of a bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapAdminResult {
    pub user_id: Uuid,
    /// Device record id to log in with
    pub device_id: Uuid,
    pub created_user: bool,
    pub created_device: bool,
}

pub struct BootstrapAdminHandler {
    pool: PgPool,
}

impl BootstrapAdminHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Existing users are promoted and get the given password
    pub async fn execute(&self, command: BootstrapAdminCommand) -> AppResult<BootstrapAdminResult> {
        let email = normalize_email(&command.email)?;
        validate_password(&command.password)?;
        let device = validate_device_id(&command.device_id)?;

        let digest = auth::hash_password(&command.password)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;

        let (user_id, created_user) = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE users SET role = 'admin', password_hash = $2, salt = $3 WHERE id = $1",
                )
                .bind(id)
                .bind(&digest.hash)
                .bind(&digest.salt)
                .execute(&mut *tx)
                .await?;
                (id, false)
            }
            None => {
                let id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO users (email, password_hash, salt, name, role)
                    VALUES ($1, $2, $3, 'Administrator', 'admin')
                    RETURNING id
                    "#,
                )
                .bind(&email)
                .bind(&digest.hash)
                .bind(&digest.salt)
                .fetch_one(&mut *tx)
                .await?;

                EventStore::append(
                    &mut tx,
                    &DomainEvent::UserRegistered {
                        user_id: id,
                        email: email.clone(),
                        name: Some("Administrator".to_string()),
                    },
                )
                .await?;
                (id, true)
            }
        };

        let device_row: Option<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, user_id FROM devices WHERE device_id = $1")
                .bind(&device)
                .fetch_optional(&mut *tx)
                .await?;

        let (device_id, created_device) = match device_row {
            Some((id, owner)) if owner == user_id => (id, false),
            Some(_) => {
                return Err(AppError::Conflict(format!(
                    "Device '{}' is registered to another user",
                    device
                )));
            }
            None => {
                let id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO devices (user_id, device_id, created_by)
                    VALUES ($1, $2, 'seed_admin')
                    RETURNING id
                    "#,
                )
                .bind(user_id)
                .bind(&device)
                .fetch_one(&mut *tx)
                .await?;

                EventStore::append(
                    &mut tx,
                    &DomainEvent::DeviceRegistered {
                        id,
                        device_id: device.clone(),
                        user_id,
                    },
                )
                .await?;
                (id, true)
            }
        };

        insert_verification(
            &mut tx,
            device_id,
            Some(user_id),
            VerificationStatus::Verified,
            Some(BOOTSTRAP_NOTE),
        )
        .await?;

        EventStore::append(
            &mut tx,
            &DomainEvent::DeviceVerificationRecorded {
                device_id,
                admin_id: user_id,
                status: VerificationStatus::Verified,
                note: Some(BOOTSTRAP_NOTE.to_string()),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, device_id = %device_id, created_user, "Admin bootstrapped");

        Ok(BootstrapAdminResult {
            user_id,
            device_id,
            created_user,
            created_device,
        })
    }
}
