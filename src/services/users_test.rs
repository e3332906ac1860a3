use super::*;
use crate::state::test_helpers::{TEST_DOMAIN, fields, seed_profile};
use crate::store::memory::MemoryStore;
use crate::store::rules::{Rules, StoreAccess};
use serde_json::json;
use std::sync::Arc;

async fn setup() -> (Arc<MemoryStore>, StoreAccess) {
    let inner = Arc::new(MemoryStore::new());
    seed_profile(inner.as_ref(), "boss", "admin", true).await;
    seed_profile(inner.as_ref(), "ops", "comex", true).await;
    seed_profile(inner.as_ref(), "plain", "user", false).await;
    let access = StoreAccess::new(inner.clone(), Rules::new(TEST_DOMAIN));
    (inner, access)
}

#[test]
fn entry_falls_back_to_email() {
    let doc = Document::new("u1", fields(json!({"email": "ana@sqquimica.com", "role": "wizard"})));
    let entry = UserEntry::from_document(&doc);
    assert_eq!(entry.name, "ana@sqquimica.com");
    assert_eq!(entry.role, Role::User);
    assert!(!entry.email_verified);
}

#[tokio::test]
async fn comex_lists_users_without_role_management() {
    let (_, access) = setup().await;
    let docs = access.as_user(Some("ops")).query(USERS, Some(&list_order())).await.unwrap();
    let view = admin_view(&docs, Role::Comex);
    assert_eq!(view.users.len(), 3);
    assert!(!view.can_manage_roles);
    assert_eq!(view.users[0].uid, "boss");
}

#[tokio::test]
async fn plain_user_cannot_list() {
    let (_, access) = setup().await;
    let err = access.as_user(Some("plain")).query(USERS, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn admin_promotes_user() {
    let (inner, access) = setup().await;
    let role = set_role(access.as_user(Some("boss")).as_ref(), "boss", "plain", "comex").await.unwrap();
    assert_eq!(role, Role::Comex);
    let doc = inner.read_one(USERS, "plain").await.unwrap().unwrap();
    assert_eq!(doc.str_field("role"), Some("comex"));
    assert_eq!(doc.str_field("name"), Some("plain"));
}

#[tokio::test]
async fn comex_cannot_promote() {
    let (_, access) = setup().await;
    let err = set_role(access.as_user(Some("ops")).as_ref(), "ops", "plain", "admin").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn invalid_changes_are_rejected() {
    let (_, access) = setup().await;
    let boss = access.as_user(Some("boss"));
    assert!(matches!(set_role(boss.as_ref(), "boss", "plain", "owner").await, Err(RoleChangeError::UnknownRole(_))));
    assert!(matches!(set_role(boss.as_ref(), "boss", "boss", "user").await, Err(RoleChangeError::SelfChange)));
    assert!(matches!(set_role(boss.as_ref(), "boss", "ghost", "user").await, Err(RoleChangeError::NotFound(_))));
}
