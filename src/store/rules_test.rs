use super::*;
use crate::store::memory::MemoryStore;
use serde_json::json;

fn fields(value: Value) -> Fields {
    let Value::Object(map) = value else { panic!("object expected") };
    map
}

fn rules() -> Rules {
    Rules::new("@comexport.com.br")
}

fn actor(uid: &str, role: Role) -> Option<Actor<'_>> {
    Some(Actor { uid, role })
}

fn req<'a>(op: Operation, collection: &'a str, id: Option<&'a str>) -> Request<'a> {
    Request { op, collection, id, before: None, after: None }
}

fn with_after<'a>(
    op: Operation,
    collection: &'a str,
    id: &'a str,
    before: Option<&'a Fields>,
    after: &'a Fields,
) -> Request<'a> {
    Request { op, collection, id: Some(id), before, after: Some(after) }
}

async fn seeded() -> (Arc<MemoryStore>, StoreAccess) {
    let inner = Arc::new(MemoryStore::new());
    for (uid, role) in [("plain", "user"), ("ops", "comex"), ("boss", "admin")] {
        inner
            .write_one("users", uid, fields(json!({"role": role, "email": format!("{uid}@comexport.com.br")})), false)
            .await
            .unwrap();
    }
    let access = StoreAccess::new(inner.clone(), rules());
    (inner, access)
}

#[test]
fn domain_is_normalized() {
    assert_eq!(Rules::new("@ComExport.com.br").corporate_domain(), "comexport.com.br");
}

#[test]
fn signed_out_is_denied_everywhere() {
    let r = rules();
    for collection in ["users", "processes", "announcements", "barra", "audit_logs"] {
        assert!(r.check(None, &req(Operation::Read, collection, Some("x"))).is_err());
    }
}

#[test]
fn user_reads_only_own_profile() {
    let r = rules();
    assert!(r.check(actor("u1", Role::User), &req(Operation::Read, "users", Some("u1"))).is_ok());
    assert!(r.check(actor("u1", Role::User), &req(Operation::Read, "users", Some("u2"))).is_err());
    assert!(r.check(actor("u1", Role::Comex), &req(Operation::Read, "users", Some("u2"))).is_ok());
    assert!(r.check(actor("u1", Role::User), &req(Operation::List, "users", None)).is_err());
}

#[test]
fn profile_creation_requires_role_user_and_corporate_email() {
    let r = rules();
    let ok = fields(json!({"email": "ana@comexport.com.br", "role": "user"}));
    let escalated = fields(json!({"email": "ana@comexport.com.br", "role": "admin"}));
    let outside = fields(json!({"email": "ana@gmail.com", "role": "user"}));

    assert!(r.check(actor("u1", Role::User), &with_after(Operation::Create, "users", "u1", None, &ok)).is_ok());
    assert!(r.check(actor("u1", Role::User), &with_after(Operation::Create, "users", "u1", None, &escalated)).is_err());
    assert!(r.check(actor("u1", Role::User), &with_after(Operation::Create, "users", "u1", None, &outside)).is_err());
    assert!(r.check(actor("u2", Role::User), &with_after(Operation::Create, "users", "u1", None, &ok)).is_err());
}

#[test]
fn only_admin_changes_roles() {
    let r = rules();
    let before = fields(json!({"role": "user", "name": "Ana"}));
    let renamed = fields(json!({"role": "user", "name": "Ana Maria"}));
    let promoted = fields(json!({"role": "comex", "name": "Ana"}));

    assert!(r.check(actor("u1", Role::User), &with_after(Operation::Update, "users", "u1", Some(&before), &renamed)).is_ok());
    assert!(r.check(actor("u1", Role::User), &with_after(Operation::Update, "users", "u1", Some(&before), &promoted)).is_err());
    assert!(r.check(actor("ops", Role::Comex), &with_after(Operation::Update, "users", "u1", Some(&before), &promoted)).is_err());
    assert!(r.check(actor("boss", Role::Admin), &with_after(Operation::Update, "users", "u1", Some(&before), &promoted)).is_ok());
}

#[test]
fn process_update_allows_owner() {
    let r = rules();
    let before = fields(json!({"owners": ["u1"]}));
    let update = Request { before: Some(&before), ..req(Operation::Update, "processes", Some("p1")) };
    assert!(r.check(actor("u1", Role::User), &update).is_ok());
    assert!(r.check(actor("u2", Role::User), &update).is_err());
    assert!(r.check(actor("u2", Role::Comex), &update).is_ok());
}

#[test]
fn process_create_and_delete_are_privileged() {
    let r = rules();
    for op in [Operation::Create, Operation::Delete] {
        assert!(r.check(actor("u", Role::User), &req(op, "processes", Some("p"))).is_err());
        assert!(r.check(actor("u", Role::Comex), &req(op, "processes", Some("p"))).is_ok());
        assert!(r.check(actor("u", Role::Admin), &req(op, "processes", Some("p"))).is_ok());
    }
}

#[test]
fn announcements_are_readable_by_all_signed_in() {
    let r = rules();
    assert!(r.check(actor("u", Role::User), &req(Operation::Read, "announcements", Some("home"))).is_ok());
    assert!(r.check(actor("u", Role::User), &req(Operation::Update, "announcements", Some("home"))).is_err());
    assert!(r.check(actor("u", Role::Comex), &req(Operation::Update, "announcements", Some("home"))).is_ok());
    assert!(r.check(actor("u", Role::User), &req(Operation::Create, "barra", Some("status"))).is_err());
}

#[test]
fn audit_log_is_append_only() {
    let r = rules();
    assert!(r.check(actor("u", Role::User), &req(Operation::Create, "audit_logs", None)).is_ok());
    assert!(r.check(actor("u", Role::Comex), &req(Operation::List, "audit_logs", None)).is_err());
    assert!(r.check(actor("u", Role::Admin), &req(Operation::List, "audit_logs", None)).is_ok());
    assert!(r.check(actor("u", Role::Admin), &req(Operation::Delete, "audit_logs", Some("a"))).is_err());
}

#[test]
fn unknown_collection_is_denied() {
    assert!(rules().check(actor("u", Role::Admin), &req(Operation::Read, "secrets", Some("x"))).is_err());
}

#[tokio::test]
async fn scoped_store_resolves_role_from_profile() {
    let (_, access) = seeded().await;
    let plain = access.as_user(Some("plain"));
    let ops = access.as_user(Some("ops"));

    let denied = plain.write_one("announcements", "home", fields(json!({"text": "x"})), true).await;
    assert!(matches!(denied, Err(StoreError::PermissionDenied(_))));
    ops.write_one("announcements", "home", fields(json!({"text": "x"})), true).await.unwrap();
    let doc = plain.read_one("announcements", "home").await.unwrap().unwrap();
    assert_eq!(doc.str_field("text"), Some("x"));
}

#[tokio::test]
async fn scoped_store_sees_role_changes_immediately() {
    let (inner, access) = seeded().await;
    let plain = access.as_user(Some("plain"));
    assert!(plain.query("users", None).await.is_err());

    inner.write_one("users", "plain", fields(json!({"role": "comex"})), true).await.unwrap();
    assert_eq!(plain.query("users", None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn merge_cannot_smuggle_role_change() {
    let (inner, access) = seeded().await;
    let plain = access.as_user(Some("plain"));
    let result = plain.write_one("users", "plain", fields(json!({"role": "admin"})), true).await;
    assert!(matches!(result, Err(StoreError::PermissionDenied(_))));
    let doc = inner.read_one("users", "plain").await.unwrap().unwrap();
    assert_eq!(doc.str_field("role"), Some("user"));
}

#[tokio::test]
async fn unknown_role_string_acts_as_user() {
    let (inner, access) = seeded().await;
    inner.write_one("users", "odd", fields(json!({"role": "superuser"})), false).await.unwrap();
    let odd = access.as_user(Some("odd"));
    assert!(odd.add("processes", Fields::new()).await.is_err());
}

#[tokio::test]
async fn signed_out_view_is_denied() {
    let (_, access) = seeded().await;
    let anon = access.as_user(None);
    assert!(anon.read_one("announcements", "home").await.is_err());
}
