//! Event Store Repository
//!
//! Events are written inside the caller's database transaction so that an
//! entity row and the event describing it commit or roll back together.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::DomainEvent;

use super::EventStoreError;

/// Current payload schema version
const EVENT_VERSION: i32 = 1;

/// Maximum page size for event listings
const MAX_PAGE: i64 = 1000;

/// Stored event from the database
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_version: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    /// Limit clamped to `1..=1000`, offset to `>= 0`
    fn page(&self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_PAGE), self.offset.max(0))
    }
}

/// Event Store for persisting and retrieving events
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    /// Create a new EventStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event using the given connection (usually an open transaction)
    pub async fn append(
        conn: &mut PgConnection,
        event: &DomainEvent,
    ) -> Result<i64, EventStoreError> {
        let payload = serde_json::to_value(event)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (aggregate_type, aggregate_id, event_type, event_version, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(event.aggregate_type())
        .bind(event.aggregate_id())
        .bind(event.event_type())
        .bind(EVENT_VERSION)
        .bind(&payload)
        .fetch_one(&mut *conn)
        .await?;

        tracing::debug!(
            event_id = id,
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id(),
            "Event appended"
        );

        Ok(id)
    }

    /// Append an event in its own implicit transaction
    pub async fn append_standalone(&self, event: &DomainEvent) -> Result<i64, EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::append(&mut *conn, event).await
    }

    /// List events newest first, with the total matching the same filter
    pub async fn list(
        &self,
        filter: &EventFilter,
    ) -> Result<(Vec<StoredEvent>, i64), EventStoreError> {
        let (limit, offset) = filter.page();

        let events: Vec<StoredEvent> = sqlx::query_as(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, event_version, payload, created_at
            FROM events
            WHERE ($1::text IS NULL OR aggregate_type = $1)
              AND ($2::uuid IS NULL OR aggregate_id = $2)
            ORDER BY id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.aggregate_type.as_deref())
        .bind(filter.aggregate_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM events
            WHERE ($1::text IS NULL OR aggregate_type = $1)
              AND ($2::uuid IS NULL OR aggregate_id = $2)
            "#,
        )
        .bind(filter.aggregate_type.as_deref())
        .bind(filter.aggregate_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((events, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_page_is_clamped() {
        let filter = EventFilter {
            limit: 5000,
            offset: -3,
            ..Default::default()
        };
        assert_eq!(filter.page(), (MAX_PAGE, 0));

        let filter = EventFilter {
            limit: 0,
            offset: 10,
            ..Default::default()
        };
        assert_eq!(filter.page(), (1, 10));
    }
}
