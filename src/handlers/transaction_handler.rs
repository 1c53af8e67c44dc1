//! Transaction Handlers
//!
//! Deposits and withdrawals append to the ledger. Withdrawals read the balance
//! and insert inside one SERIALIZABLE transaction so two concurrent
//! withdrawals cannot both pass the overdraft check.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::db;
use crate::domain::{DomainError, DomainEvent, OperationContext, TransactionType};
use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;
use crate::ledger::{self, BalanceService};

use super::account_handler::find_visible_account;
use super::{require_user, CreateTransactionCommand, TransactionView};

/// Attempts before a serialization failure is reported to the client
const MAX_RETRIES: u32 = 3;

/// Transactions returned by the dashboard preview
pub const PREVIEW_LIMIT: i64 = 2;

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    account_id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    amount: Decimal,
    reference: Option<String>,
    meta: Option<serde_json::Value>,
    status: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionView {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(TransactionView {
            id: row.id,
            account_id: row.account_id,
            kind: row.kind.parse()?,
            amount: row.amount,
            reference: row.reference,
            meta: row.meta,
            status: row.status.parse()?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

// =========================================================================
// CreateTransactionHandler
// =========================================================================

/// Handler for deposits and withdrawals
pub struct CreateTransactionHandler {
    pool: PgPool,
    balances: BalanceService,
    audit: AuditLogService,
    snapshot_threshold: i64,
}

impl CreateTransactionHandler {
    pub fn new(pool: PgPool, snapshot_threshold: i64) -> Self {
        Self {
            balances: BalanceService::new(pool.clone()),
            audit: AuditLogService::new(pool.clone()),
            pool,
            snapshot_threshold,
        }
    }

    /// Execute the command, retrying serialization failures with linear backoff
    pub async fn execute(
        &self,
        command: CreateTransactionCommand,
        context: &OperationContext,
    ) -> AppResult<TransactionView> {
        let user_id = require_user(context)?;

        let mut conn = self.pool.acquire().await?;
        find_visible_account(&mut conn, command.account_id, context).await?;
        drop(conn);

        let mut attempt = 0;
        let created = loop {
            match self.try_record(&command, user_id).await {
                Ok(created) => break created,
                Err(AppError::Database(e)) if db::is_serialization_failure(&e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        tracing::warn!(
                            account_id = %command.account_id,
                            attempts = attempt,
                            "Giving up after repeated serialization failures"
                        );
                        return Err(AppError::SerializationConflict);
                    }
                    tracing::debug!(
                        account_id = %command.account_id,
                        attempt,
                        "Serialization failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(AppError::Domain(DomainError::InsufficientFunds { required, available })) => {
                    self.record_rejection(&command, user_id, available).await;
                    return Err(DomainError::insufficient_funds(required, available).into());
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            transaction_id = %created.id,
            account_id = %created.account_id,
            kind = %created.kind,
            amount = %created.amount,
            "Transaction recorded"
        );

        // Snapshot materialization never fails the request
        if let Err(e) = self
            .balances
            .snapshot_if_needed(created.account_id, self.snapshot_threshold)
            .await
        {
            tracing::warn!(account_id = %created.account_id, error = %e, "Snapshot failed");
        }

        Ok(created)
    }

    /// One attempt: lock the account, check the balance for withdrawals,
    /// insert the row and its event, commit.
    async fn try_record(
        &self,
        command: &CreateTransactionCommand,
        user_id: Uuid,
    ) -> AppResult<TransactionView> {
        let mut tx = self.pool.begin().await?;

        if command.kind == TransactionType::Withdrawal {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }

        ledger::lock_account(&mut tx, command.account_id).await?;

        if command.kind == TransactionType::Withdrawal {
            let current = BalanceService::compute_balance(&mut tx, command.account_id).await?;
            ledger::ensure_sufficient(current.balance, &command.amount)?;
        }

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (account_id, type, amount, reference, meta, status, created_by)
            VALUES ($1, $2, $3, $4, $5, 'COMPLETED', $6)
            RETURNING id, account_id, type, amount, reference, meta, status, created_by, created_at
            "#,
        )
        .bind(command.account_id)
        .bind(command.kind.as_str())
        .bind(command.amount.value())
        .bind(&command.reference)
        .bind(&command.meta)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let event = DomainEvent::transaction_created(
            command.kind,
            row.id,
            row.account_id,
            row.amount,
        );
        EventStore::append(&mut tx, &event).await?;

        AuditLogService::log_with(
            &mut tx,
            AuditLogBuilder::new(AuditAction::TransactionCreated)
                .user_id(Some(user_id))
                .meta(&serde_json::json!({
                    "transaction_id": row.id,
                    "account_id": row.account_id,
                    "type": command.kind,
                    "amount": row.amount,
                })),
        )
        .await?;

        tx.commit().await?;

        Ok(row.try_into()?)
    }

    async fn record_rejection(
        &self,
        command: &CreateTransactionCommand,
        user_id: Uuid,
        available: Decimal,
    ) {
        let entry = AuditLogBuilder::new(AuditAction::WithdrawalRejected)
            .user_id(Some(user_id))
            .meta(&serde_json::json!({
                "account_id": command.account_id,
                "amount": command.amount,
                "available": available,
            }));

        if let Err(e) = self.audit.log(entry).await {
            tracing::warn!(error = %e, "Failed to audit rejected withdrawal");
        }
    }
}

// =========================================================================
// ListTransactionsHandler
// =========================================================================

pub struct ListTransactionsHandler {
    pool: PgPool,
}

impl ListTransactionsHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Newest first; only the latest `PREVIEW_LIMIT` unless `all` is set
    pub async fn execute(
        &self,
        account_id: Uuid,
        all: bool,
        context: &OperationContext,
    ) -> AppResult<Vec<TransactionView>> {
        let mut conn = self.pool.acquire().await?;
        find_visible_account(&mut conn, account_id, context).await?;

        let limit: Option<i64> = if all { None } else { Some(PREVIEW_LIMIT) };

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, account_id, type, amount, reference, meta, status, created_by, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY ledger_seq DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| TransactionView::try_from(row).map_err(AppError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transaction_row_conversion() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            kind: "WITHDRAWAL".to_string(),
            amount: dec!(12.50),
            reference: Some("atm".to_string()),
            meta: None,
            status: "COMPLETED".to_string(),
            created_by: None,
            created_at: Utc::now(),
        };

        let view: TransactionView = row.try_into().unwrap();
        assert_eq!(view.kind, TransactionType::Withdrawal);
        assert_eq!(view.status, TransactionStatus::Completed);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "WITHDRAWAL");
        assert_eq!(json["status"], "COMPLETED");
    }

    #[test]
    fn test_transaction_row_unknown_type() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            kind: "TRANSFER".to_string(),
            amount: dec!(1.00),
            reference: None,
            meta: None,
            status: "COMPLETED".to_string(),
            created_by: None,
            created_at: Utc::now(),
        };

        assert!(TransactionView::try_from(row).is_err());
    }
}
