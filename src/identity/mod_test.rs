use super::*;
use std::sync::Mutex;
use std::time::Duration;

fn identity(uid: &str, verified: bool) -> Identity {
    Identity {
        uid: uid.into(),
        email: Some(format!("{uid}@sqquimica.com")),
        display_name: None,
        email_verified: verified,
    }
}

#[test]
fn normalize_email_trims_and_lowercases() {
    assert_eq!(normalize_email("  Ana@SQQuimica.com "), Some("ana@sqquimica.com".into()));
}

#[test]
fn normalize_email_rejects_malformed() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("no-at-sign"), None);
    assert_eq!(normalize_email("@domain.com"), None);
    assert_eq!(normalize_email("user@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
}

#[test]
fn persistence_from_remember() {
    assert_eq!(Persistence::from_remember(true), Persistence::Durable);
    assert_eq!(Persistence::from_remember(false), Persistence::TabScoped);
    assert_eq!(Persistence::default(), Persistence::TabScoped);
}

#[test]
fn error_kinds() {
    assert_eq!(IdentityError::InvalidCredentials.kind(), ErrorKind::Validation);
    assert_eq!(IdentityError::NoCurrentUser.kind(), ErrorKind::PermissionDenied);
    assert_eq!(IdentityError::Network("timeout".into()).kind(), ErrorKind::Network);
}

#[tokio::test]
async fn notifier_delivers_initial_state_then_changes() {
    let notifier = SessionNotifier::new();
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
    let _sub = notifier.subscribe(Arc::new({
        let seen = seen.clone();
        move |id: Option<Identity>| seen.lock().unwrap().push(id.map(|i| i.uid))
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    notifier.publish(Some(identity("a", false)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    notifier.publish(None);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*seen.lock().unwrap(), vec![None, Some("a".to_owned()), None]);
}

#[tokio::test]
async fn silent_update_does_not_notify() {
    let notifier = SessionNotifier::new();
    notifier.publish(Some(identity("a", false)));

    let calls = Arc::new(Mutex::new(0usize));
    let _sub = notifier.subscribe(Arc::new({
        let calls = calls.clone();
        move |_: Option<Identity>| *calls.lock().unwrap() += 1
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    notifier.update_silently(identity("a", true));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(notifier.current().unwrap().email_verified);
}

#[tokio::test]
async fn silent_update_ignores_other_uid() {
    let notifier = SessionNotifier::new();
    notifier.publish(Some(identity("a", false)));
    notifier.update_silently(identity("b", true));
    assert_eq!(notifier.current().unwrap().uid, "a");
}
