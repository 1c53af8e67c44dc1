//! Database module
//!
//! Database connection and migration utilities.

use sqlx::PgPool;

/// Tables the service cannot run without
const REQUIRED_TABLES: &[&str] = &[
    "users",
    "refresh_tokens",
    "devices",
    "device_verifications",
    "accounts",
    "transactions",
    "account_balance_snapshots",
    "audit_logs",
    "events",
    "rate_limit_buckets",
];

/// Apply the SQL migrations embedded from `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    if admins == 0 {
        tracing::warn!("No admin user exists; run the seed_admin binary to create one");
    }

    Ok(true)
}

/// Whether an error is a PostgreSQL unique-constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Whether an error is a serialization failure of a SERIALIZABLE transaction
pub fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_tables_cover_ledger() {
        assert!(REQUIRED_TABLES.contains(&"transactions"));
        assert!(REQUIRED_TABLES.contains(&"account_balance_snapshots"));
    }

    #[test]
    fn test_non_database_errors_are_not_classified() {
        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
        assert!(!is_serialization_failure(&err));
    }
}
