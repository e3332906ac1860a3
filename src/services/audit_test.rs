use super::*;
use crate::error::ErrorKind;
use crate::state::test_helpers::{TEST_DOMAIN, fields, seed_profile};
use crate::store::memory::MemoryStore;
use crate::store::rules::{Rules, StoreAccess};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn record_writes_entry_with_diff() {
    let store = MemoryStore::new();
    record(&store, "processes/p1", Action::Update, "u1", Some(json!({"status": "liberado"}))).await;
    record(&store, "processes/p1", Action::Delete, "u1", None).await;

    let docs = store.query(AUDIT_LOGS, None).await.unwrap();
    assert_eq!(docs.len(), 2);
    let update = docs.iter().find(|d| d.str_field("action") == Some("update")).unwrap();
    assert_eq!(update.str_field("entity"), Some("processes/p1"));
    assert_eq!(update.fields["diff"], json!({"status": "liberado"}));
    assert!(update.str_field("createdAt").is_some());
}

#[tokio::test]
async fn recent_is_newest_first_and_limited() {
    let store = MemoryStore::new();
    for (id, at) in [("a", "2026-01-01T00:00:00Z"), ("b", "2026-03-01T00:00:00Z"), ("c", "2026-02-01T00:00:00Z")] {
        store
            .write_one(AUDIT_LOGS, id, fields(json!({"entity": id, "action": "update", "userId": "u", "createdAt": at})), false)
            .await
            .unwrap();
    }
    let entries = recent(&store, 2).await.unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(entries[0].user_id, "u");
}

#[tokio::test]
async fn recent_orders_by_instant_not_text() {
    let store = MemoryStore::new();
    for (id, at) in [("newer", "2026-01-01T00:00:00.15Z"), ("older", "2026-01-01T00:00:00.1Z")] {
        store
            .write_one(AUDIT_LOGS, id, fields(json!({"entity": id, "action": "update", "userId": "u", "createdAt": at})), false)
            .await
            .unwrap();
    }
    let ids: Vec<String> = recent(&store, 10).await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["newer", "older"]);
}

#[tokio::test]
async fn only_admins_read_the_log() {
    let inner = Arc::new(MemoryStore::new());
    seed_profile(inner.as_ref(), "boss", "admin", true).await;
    seed_profile(inner.as_ref(), "ops", "comex", true).await;
    let access = StoreAccess::new(inner.clone(), Rules::new(TEST_DOMAIN));

    let ops = access.as_user(Some("ops"));
    record(ops.as_ref(), "processes/p1", Action::Delete, "ops", None).await;
    let err = recent(ops.as_ref(), 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let entries = recent(access.as_user(Some("boss")).as_ref(), 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, "ops");
}
