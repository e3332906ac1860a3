use super::*;
use crate::store::Fields;
use crate::store::memory::MemoryStore;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn text(value: &str) -> Fields {
    let mut f = Fields::new();
    f.insert("text".into(), json!(value));
    f
}

#[tokio::test]
async fn one_delivers_initial_then_updates() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let _sub = subscribe_one(
        store.clone(),
        "announcements",
        "home",
        Arc::new({
            let seen = seen.clone();
            move |snap: Result<Option<Document>, StoreError>| {
                let text = snap.unwrap().and_then(|d| d.str_field("text").map(str::to_owned));
                seen.lock().unwrap().push(text);
            }
        }),
    );
    settle().await;
    store.write_one("announcements", "home", text("hello"), true).await.unwrap();
    settle().await;
    store.write_one("announcements", "global", text("ignored"), true).await.unwrap();
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec![None, Some("hello".to_owned())]);
}

#[tokio::test]
async fn one_stops_after_dispose() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(Mutex::new(0usize));
    let mut sub = subscribe_one(
        store.clone(),
        "users",
        "u1",
        Arc::new({
            let calls = calls.clone();
            move |_: Result<Option<Document>, StoreError>| *calls.lock().unwrap() += 1
        }),
    );
    settle().await;
    assert_eq!(*calls.lock().unwrap(), 1);

    sub.dispose();
    store.write_one("users", "u1", text("x"), false).await.unwrap();
    settle().await;
    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(!sub.is_active());
}

#[tokio::test]
async fn collection_redelivers_full_list() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let sizes: Arc<Mutex<Vec<usize>>> = Arc::default();
    let _sub = subscribe_collection(
        store.clone(),
        "processes",
        Some(OrderBy::asc("eta_original")),
        Arc::new({
            let sizes = sizes.clone();
            move |snap: Result<Vec<Document>, StoreError>| sizes.lock().unwrap().push(snap.unwrap().len())
        }),
    );
    settle().await;
    store.add("processes", Fields::new()).await.unwrap();
    settle().await;
    store.add("processes", Fields::new()).await.unwrap();
    settle().await;
    store.add("users", Fields::new()).await.unwrap();
    settle().await;

    assert_eq!(*sizes.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn collection_drop_stops_delivery() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(Mutex::new(0usize));
    let sub = subscribe_collection(
        store.clone(),
        "processes",
        None,
        Arc::new({
            let calls = calls.clone();
            move |_: Result<Vec<Document>, StoreError>| *calls.lock().unwrap() += 1
        }),
    );
    settle().await;
    drop(sub);
    store.add("processes", Fields::new()).await.unwrap();
    settle().await;
    assert_eq!(*calls.lock().unwrap(), 1);
}
