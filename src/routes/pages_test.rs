use super::*;
use crate::routes::tests::{Client, signed_in};
use crate::state::test_helpers::{fields, test_app};
use crate::store::DocumentStore;
use serde_json::json;

#[tokio::test]
async fn guarded_pages_redirect_signed_out_visitors() {
    let app = test_app();
    let mut client = Client::new(&app);
    for path in ["/", "/processes", "/processes/p1", "/admin"] {
        let reply = client.get(path).await;
        assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT, "{path}");
        assert_eq!(reply.location(), Some("/login"), "{path}");
    }
    assert_eq!(client.get("/register").await.status, StatusCode::OK);
    assert_eq!(client.get("/verify-email").await.status, StatusCode::OK);
}

#[tokio::test]
async fn home_renders_every_section() {
    let app = test_app();
    app.store.write_one("barra", "status", fields(json!({"status": "PRATICÁVEL"})), false).await.unwrap();
    app.store.write_one("announcements", "home", fields(json!({"text": "Bom dia"})), false).await.unwrap();
    let (mut client, _) = signed_in(&app, "plain", None).await;

    let reply = client.get("/").await;
    assert_eq!(reply.status, StatusCode::OK);
    let data = &reply.body["data"];
    assert_eq!(data["announcement"]["text"], "Bom dia");
    assert_eq!(data["announcement"]["can_edit"], false);
    assert_eq!(data["bar"]["data"]["condition"], "open");
    assert!(data["upcoming"]["error"].is_null());
    let nav = reply.body["header"]["nav"].as_array().unwrap();
    assert_eq!(nav.len(), 2);
}

#[tokio::test]
async fn process_list_shows_create_only_to_privileged_roles() {
    let app = test_app();
    app.store.write_one("processes", "b", fields(json!({"processo": "B", "eta_original": "2026-05-02"})), false).await.unwrap();
    app.store.write_one("processes", "a", fields(json!({"processo": "A", "eta_original": "2026-04-01"})), false).await.unwrap();

    let (mut plain, _) = signed_in(&app, "plain", None).await;
    let reply = plain.get("/processes").await;
    let list = &reply.body["data"]["data"];
    assert_eq!(list["can_create"], false);
    let titles: Vec<&str> = list["processes"].as_array().unwrap().iter().filter_map(|p| p["title"].as_str()).collect();
    assert_eq!(titles, vec!["A", "B"]);

    let (mut boss, _) = signed_in(&app, "boss", Some("admin")).await;
    let reply = boss.get("/processes").await;
    assert_eq!(reply.body["data"]["data"]["can_create"], true);
}

#[tokio::test]
async fn admin_panel_is_for_admin_and_comex() {
    let app = test_app();
    let (mut plain, _) = signed_in(&app, "plain", None).await;
    let reply = plain.get("/admin").await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(reply.location(), Some("/"));

    let (mut ops, _) = signed_in(&app, "ops", Some("comex")).await;
    let reply = ops.get("/admin").await;
    assert_eq!(reply.status, StatusCode::OK);
    let view = &reply.body["data"]["data"];
    assert_eq!(view["can_manage_roles"], false);
    assert_eq!(view["users"].as_array().unwrap().len(), 2);

    let (mut boss, _) = signed_in(&app, "boss", Some("admin")).await;
    let reply = boss.get("/admin").await;
    assert_eq!(reply.body["data"]["data"]["can_manage_roles"], true);
}
