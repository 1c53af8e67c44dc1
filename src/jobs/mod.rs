//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::ledger::{BalanceService, LedgerError};

/// Accounts snapshotted per sweep
const SNAPSHOT_BATCH: i64 = 100;

/// Revoked refresh tokens are kept this long for audit purposes
const REVOKED_TOKEN_RETENTION_DAYS: i32 = 7;

// =========================================================================
// Rate Limit Bucket Cleanup
// =========================================================================

/// Remove rate limit buckets older than 2 minutes
pub async fn cleanup_rate_limit_buckets(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM rate_limit_buckets
        WHERE window_start < NOW() - INTERVAL '2 minutes'
        "#,
    )
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Cleaned up expired rate limit buckets");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Refresh Token Purge
// =========================================================================

/// Delete refresh tokens that expired, or were revoked more than 7 days ago
pub async fn purge_expired_refresh_tokens(pool: &PgPool) -> Result<u64, JobError> {
    let result = sqlx::query(
        r#"
        DELETE FROM refresh_tokens
        WHERE expires_at < NOW()
           OR revoked_at < NOW() - make_interval(days => $1)
        "#,
    )
    .bind(REVOKED_TOKEN_RETENTION_DAYS)
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(rows_deleted, "Purged expired refresh tokens");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Balance Snapshot Sweep
// =========================================================================

/// Snapshot every account whose un-snapshotted transaction count reached `threshold`
pub async fn materialize_balance_snapshots(
    pool: &PgPool,
    threshold: i64,
) -> Result<u64, JobError> {
    let balances = BalanceService::new(pool.clone());
    let accounts = balances
        .accounts_needing_snapshot(threshold, SNAPSHOT_BATCH)
        .await?;

    let mut taken = 0;
    for account_id in accounts {
        match balances.take_snapshot(account_id).await {
            Ok(Some(_)) => taken += 1,
            Ok(None) => {}
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "Snapshot failed");
            }
        }
    }

    if taken > 0 {
        tracing::info!(snapshots = taken, "Materialized balance snapshots");
    }

    Ok(taken)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for rate limit cleanup (default: 1 minute)
    pub rate_limit_cleanup_interval: Duration,
    /// Interval for refresh token purge (default: 1 hour)
    pub token_purge_interval: Duration,
    /// Interval for the snapshot sweep (default: 5 minutes)
    pub snapshot_interval: Duration,
    /// Transactions since the last snapshot that trigger a new one
    pub snapshot_threshold: i64,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_cleanup_interval: Duration::from_secs(60),
            token_purge_interval: Duration::from_secs(3600),
            snapshot_interval: Duration::from_secs(300),
            snapshot_threshold: 50,
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut rate_limit_interval = interval(self.config.rate_limit_cleanup_interval);
        let mut token_interval = interval(self.config.token_purge_interval);
        let mut snapshot_interval = interval(self.config.snapshot_interval);

        loop {
            tokio::select! {
                _ = rate_limit_interval.tick() => {
                    if let Err(e) = cleanup_rate_limit_buckets(&self.pool).await {
                        tracing::error!(error = %e, "Rate limit cleanup failed");
                    }
                }
                _ = token_interval.tick() => {
                    if let Err(e) = purge_expired_refresh_tokens(&self.pool).await {
                        tracing::error!(error = %e, "Refresh token purge failed");
                    }
                }
                _ = snapshot_interval.tick() => {
                    if let Err(e) = materialize_balance_snapshots(
                        &self.pool,
                        self.config.snapshot_threshold,
                    ).await {
                        tracing::error!(error = %e, "Snapshot sweep failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match cleanup_rate_limit_buckets(&self.pool).await {
            Ok(count) => report.rate_limit_buckets_cleaned = count,
            Err(e) => report.errors.push(format!("Rate limit cleanup: {}", e)),
        }

        match purge_expired_refresh_tokens(&self.pool).await {
            Ok(count) => report.refresh_tokens_purged = count,
            Err(e) => report.errors.push(format!("Refresh token purge: {}", e)),
        }

        match materialize_balance_snapshots(&self.pool, self.config.snapshot_threshold).await {
            Ok(count) => report.snapshots_taken = count,
            Err(e) => report.errors.push(format!("Snapshot sweep: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub rate_limit_buckets_cleaned: u64,
    pub refresh_tokens_purged: u64,
    pub snapshots_taken: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.rate_limit_cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.token_purge_interval, Duration::from_secs(3600));
        assert_eq!(config.snapshot_interval, Duration::from_secs(300));
        assert_eq!(config.snapshot_threshold, 50);
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.rate_limit_buckets_cleaned, 0);
        assert_eq!(report.snapshots_taken, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::from(LedgerError::AccountNotFound(uuid::Uuid::nil()));
        assert!(err.to_string().contains("Account not found"));
    }
}
