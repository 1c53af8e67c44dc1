//! Account Handlers

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, DomainEvent, OperationContext};
use crate::error::AppResult;
use crate::event_store::EventStore;
use crate::ledger::{BalanceService, BalanceView};

use super::{normalize_currency, require_user, AccountView, CreateAccountCommand};

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    user_id: Uuid,
    currency: String,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for AccountView {
    fn from(row: AccountRow) -> Self {
        AccountView {
            id: row.id,
            user_id: row.user_id,
            currency: row.currency,
            created_at: row.created_at,
        }
    }
}

/// Load an account visible to the caller: its owner, or any admin.
/// Accounts of other users are reported as missing.
pub(crate) async fn find_visible_account(
    conn: &mut PgConnection,
    account_id: Uuid,
    context: &OperationContext,
) -> AppResult<AccountView> {
    let user_id = require_user(context)?;

    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, user_id, currency, created_at FROM accounts WHERE id = $1",
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) if row.user_id == user_id || context.is_admin() => Ok(row.into()),
        _ => Err(DomainError::AccountNotFound(account_id.to_string()).into()),
    }
}

// =========================================================================
// CreateAccountHandler
// =========================================================================

pub struct CreateAccountHandler {
    pool: PgPool,
}

impl CreateAccountHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(
        &self,
        command: CreateAccountCommand,
        context: &OperationContext,
    ) -> AppResult<AccountView> {
        let user_id = require_user(context)?;
        let currency = normalize_currency(command.currency.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (user_id, currency)
            VALUES ($1, $2)
            RETURNING id, user_id, currency, created_at
            "#,
        )
        .bind(user_id)
        .bind(&currency)
        .fetch_one(&mut *tx)
        .await?;

        let event = DomainEvent::AccountOpened {
            account_id: row.id,
            user_id,
            currency: row.currency.clone(),
        };
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::AccountOpened)
                .user_id(Some(user_id))
                .meta(&serde_json::json!({
                    "account_id": row.id,
                    "currency": row.currency,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(account_id = %row.id, user_id = %user_id, "Account opened");

        Ok(row.into())
    }
}

// =========================================================================
// Queries
// =========================================================================

pub struct ListAccountsHandler {
    pool: PgPool,
}

impl ListAccountsHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Accounts owned by the caller, oldest first
    pub async fn execute(&self, context: &OperationContext) -> AppResult<Vec<AccountView>> {
        let user_id = require_user(context)?;

        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, user_id, currency, created_at
            FROM accounts
            WHERE user_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AccountView::from).collect())
    }
}

pub struct BalanceHandler {
    pool: PgPool,
    balances: BalanceService,
}

impl BalanceHandler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            balances: BalanceService::new(pool.clone()),
            pool,
        }
    }

    pub async fn execute(
        &self,
        account_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<BalanceView> {
        let mut conn = self.pool.acquire().await?;
        find_visible_account(&mut conn, account_id, context).await?;
        drop(conn);

        self.balances
            .get_balance(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_id.to_string()).into())
    }
}
