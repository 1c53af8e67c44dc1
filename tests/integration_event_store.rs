//! Integration tests for the event store and audit log

use uuid::Uuid;

use jambo_backend::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use jambo_backend::domain::DomainEvent;
use jambo_backend::event_store::{EventFilter, EventStore};

mod common;

#[tokio::test]
async fn test_event_store_append_and_list() {
    let Some(pool) = common::setup_test_db().await else { return };
    let store = EventStore::new(pool.clone());
    let user_id = Uuid::new_v4();

    let first = store
        .append_standalone(&DomainEvent::UserRegistered {
            user_id,
            email: "events@example.com".to_string(),
            name: None,
        })
        .await
        .unwrap();
    let second = store
        .append_standalone(&DomainEvent::UserLoggedIn {
            user_id,
            device_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    assert!(second > first);

    let filter = EventFilter {
        aggregate_type: Some("user".to_string()),
        aggregate_id: Some(user_id),
        limit: 10,
        offset: 0,
    };
    let (events, total) = store.list(&filter).await.unwrap();

    assert_eq!(total, 2);
    assert_eq!(events[0].event_type, "UserLoggedIn");
    assert_eq!(events[1].event_type, "UserRegistered");
    assert_eq!(events[1].payload["email"], "events@example.com");

    // Round-trips through the stored payload
    let decoded: DomainEvent = serde_json::from_value(events[1].payload.clone()).unwrap();
    assert_eq!(decoded.aggregate_id(), user_id);
}

#[tokio::test]
async fn test_events_are_append_only() {
    let Some(pool) = common::setup_test_db().await else { return };
    let store = EventStore::new(pool.clone());

    let id = store
        .append_standalone(&DomainEvent::UserRegistered {
            user_id: Uuid::new_v4(),
            email: "immutable@example.com".to_string(),
            name: None,
        })
        .await
        .unwrap();

    let update = sqlx::query("UPDATE events SET event_type = 'Tampered' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await;
    assert!(delete.is_err());
}

#[tokio::test]
async fn test_audit_log_roundtrip() {
    let Some(pool) = common::setup_test_db().await else { return };
    let audit = AuditLogService::new(pool.clone());
    let user_id = Uuid::new_v4();

    audit
        .log(
            AuditLogBuilder::new(AuditAction::LoginFailed)
                .user_id(Some(user_id))
                .meta(&serde_json::json!({ "reason": "bad password" })),
        )
        .await
        .unwrap();
    audit
        .log(AuditLogBuilder::custom("GET /api/users/me").user_id(Some(user_id)))
        .await
        .unwrap();

    let entries = audit.list(Some(user_id), 10, 0).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "GET /api/users/me");
    assert_eq!(entries[1].meta.as_ref().unwrap()["reason"], "bad password");

    let update = sqlx::query("UPDATE audit_logs SET action = 'x' WHERE user_id = $1")
        .bind(user_id)
        .execute(&pool)
        .await;
    assert!(update.is_err());
}
