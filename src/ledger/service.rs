//! Balance Service
//!
//! Reads balances from the ledger and materializes snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::DomainEvent;
use crate::event_store::EventStore;

use super::LedgerError;

/// Balance of an account as computed from the ledger
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AccountBalance {
    pub balance: Decimal,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    /// Completed transactions recorded after the latest snapshot
    pub unsnapshotted: i64,
}

/// Balance response with the account's currency
#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

/// A materialized balance snapshot
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Snapshot {
    pub id: i64,
    pub account_id: Uuid,
    pub balance: Decimal,
    pub last_tx_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Balance Service
#[derive(Debug, Clone)]
pub struct BalanceService {
    pool: PgPool,
}

impl BalanceService {
    /// Create a new BalanceService
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // compute_balance
    // =========================================================================

    /// Latest snapshot plus the signed sum of completed transactions after it.
    ///
    /// Runs on the given connection so a withdrawal can read the balance inside
    /// its own serializable transaction.
    pub async fn compute_balance(
        conn: &mut PgConnection,
        account_id: Uuid,
    ) -> Result<AccountBalance, LedgerError> {
        let row = sqlx::query_as::<_, AccountBalance>(
            r#"
            WITH latest_snapshot AS (
                SELECT s.balance, s.created_at, t.ledger_seq AS last_seq
                FROM account_balance_snapshots s
                JOIN transactions t ON t.id = s.last_tx_id
                WHERE s.account_id = $1
                ORDER BY s.id DESC
                LIMIT 1
            ),
            delta AS (
                SELECT
                    COALESCE(SUM(CASE WHEN t.type = 'DEPOSIT' THEN t.amount ELSE -t.amount END), 0) AS amount,
                    COUNT(*) AS tx_count
                FROM transactions t
                WHERE t.account_id = $1
                  AND t.status = 'COMPLETED'
                  AND t.ledger_seq > COALESCE((SELECT last_seq FROM latest_snapshot), 0)
            )
            SELECT
                COALESCE((SELECT balance FROM latest_snapshot), 0) + delta.amount AS balance,
                (SELECT created_at FROM latest_snapshot) AS last_snapshot_at,
                delta.tx_count AS unsnapshotted
            FROM delta
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Balance of an account with its currency, `None` if the account does not exist
    pub async fn get_balance(&self, account_id: Uuid) -> Result<Option<BalanceView>, LedgerError> {
        let mut conn = self.pool.acquire().await?;

        let currency: Option<String> =
            sqlx::query_scalar("SELECT currency FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some(currency) = currency else {
            return Ok(None);
        };

        let computed = Self::compute_balance(&mut conn, account_id).await?;

        Ok(Some(BalanceView {
            account_id,
            balance: computed.balance,
            currency,
            last_snapshot_at: computed.last_snapshot_at,
        }))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Materialize the current balance. Returns `None` when nothing was
    /// recorded since the latest snapshot.
    pub async fn take_snapshot(&self, account_id: Uuid) -> Result<Option<Snapshot>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Ledger writers hold the same row lock, so no transaction for this
        // account can commit between the balance read and the insert below.
        lock_account(&mut tx, account_id).await?;

        let computed = Self::compute_balance(&mut tx, account_id).await?;
        if computed.unsnapshotted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let last_tx_id: Uuid = sqlx::query_scalar(
            r#"
            SELECT id FROM transactions
            WHERE account_id = $1 AND status = 'COMPLETED'
            ORDER BY ledger_seq DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        let snapshot = sqlx::query_as::<_, Snapshot>(
            r#"
            INSERT INTO account_balance_snapshots (account_id, balance, last_tx_id)
            VALUES ($1, $2, $3)
            RETURNING id, account_id, balance, last_tx_id, created_at
            "#,
        )
        .bind(account_id)
        .bind(computed.balance)
        .bind(last_tx_id)
        .fetch_one(&mut *tx)
        .await?;

        let event = DomainEvent::BalanceSnapshotTaken {
            account_id,
            balance: snapshot.balance,
            last_tx_id,
        };
        EventStore::append(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            balance = %snapshot.balance,
            covered = computed.unsnapshotted,
            "Balance snapshot taken"
        );

        Ok(Some(snapshot))
    }

    /// Take a snapshot once `threshold` transactions have accumulated
    pub async fn snapshot_if_needed(
        &self,
        account_id: Uuid,
        threshold: i64,
    ) -> Result<Option<Snapshot>, LedgerError> {
        if threshold <= 0 {
            return Ok(None);
        }

        let mut conn = self.pool.acquire().await?;
        let computed = Self::compute_balance(&mut conn, account_id).await?;
        drop(conn);

        if computed.unsnapshotted < threshold {
            return Ok(None);
        }

        self.take_snapshot(account_id).await
    }

    /// Accounts whose un-snapshotted transaction count reached `threshold`
    pub async fn accounts_needing_snapshot(
        &self,
        threshold: i64,
        limit: i64,
    ) -> Result<Vec<Uuid>, LedgerError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT a.id
            FROM accounts a
            LEFT JOIN LATERAL (
                SELECT t.ledger_seq AS last_seq
                FROM account_balance_snapshots s
                JOIN transactions t ON t.id = s.last_tx_id
                WHERE s.account_id = a.id
                ORDER BY s.id DESC
                LIMIT 1
            ) snap ON TRUE
            WHERE (
                SELECT COUNT(*) FROM transactions t
                WHERE t.account_id = a.id
                  AND t.status = 'COMPLETED'
                  AND t.ledger_seq > COALESCE(snap.last_seq, 0)
            ) >= $1
            ORDER BY a.created_at
            LIMIT $2
            "#,
        )
        .bind(threshold.max(1))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// Take the per-account ledger lock. Fails with `AccountNotFound` for unknown ids.
pub(crate) async fn lock_account(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> Result<(), LedgerError> {
    let found: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await?;

    found.map(|_| ()).ok_or(LedgerError::AccountNotFound(account_id))
}
