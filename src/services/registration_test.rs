use super::*;
use crate::identity::memory::{EmailKind, MemoryIdentityDirectory};
use crate::identity::{IdentityConnector, Persistence};
use crate::state::test_helpers::TEST_DOMAIN;
use crate::store::memory::MemoryStore;
use crate::store::rules::{Rules, StoreAccess};
use crate::subscription::{Listener, Subscription};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn form(name: &str, email: &str, password: &str) -> Registration {
    Registration { name: name.into(), email: email.into(), password: password.into() }
}

/// Provider whose first `failures` verification sends fail.
struct FlakyMail {
    inner: Arc<dyn IdentityProvider>,
    failures: AtomicUsize,
}

#[async_trait::async_trait]
impl IdentityProvider for FlakyMail {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        self.inner.create_account(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str, persistence: Persistence) -> Result<Identity, IdentityError> {
        self.inner.sign_in(email, password, persistence).await
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.inner.sign_out().await
    }

    async fn send_verification_email(&self, identity: &Identity) -> Result<(), IdentityError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(IdentityError::Network("smtp timeout".into()));
        }
        self.inner.send_verification_email(identity).await
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, IdentityError> {
        self.inner.refresh(identity).await
    }

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<Identity, IdentityError> {
        self.inner.update_display_name(identity, name).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.inner.send_password_reset(email).await
    }

    fn set_persistence(&self, mode: Persistence) {
        self.inner.set_persistence(mode);
    }

    fn persistence(&self) -> Persistence {
        self.inner.persistence()
    }

    fn current(&self) -> Option<Identity> {
        self.inner.current()
    }

    fn on_session_change(&self, listener: Listener<Option<Identity>>) -> Subscription {
        self.inner.on_session_change(listener)
    }
}

struct Harness {
    directory: MemoryIdentityDirectory,
    store: Arc<MemoryStore>,
    access: StoreAccess,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let access = StoreAccess::new(store.clone(), Rules::new(TEST_DOMAIN));
    Harness { directory: MemoryIdentityDirectory::new(), store, access }
}

impl Harness {
    async fn register(&self, provider: &dyn IdentityProvider, form: &Registration) -> Result<RegistrationOutcome, RegistrationError> {
        let access = self.access.clone();
        register(provider, move |uid| access.as_user(Some(uid)), form, TEST_DOMAIN).await
    }
}

#[test]
fn validation_order() {
    let bad_domain = form("Ana", "ana@gmail.com", "secret1");
    assert!(matches!(validate(&bad_domain, TEST_DOMAIN), Err(RegistrationError::InvalidDomain(_))));
    let no_name = form("  ", "ana@sqquimica.com", "secret1");
    assert!(matches!(validate(&no_name, TEST_DOMAIN), Err(RegistrationError::MissingName)));
    let no_password = form("Ana", "ana@sqquimica.com", "");
    assert!(matches!(validate(&no_password, TEST_DOMAIN), Err(RegistrationError::MissingPassword)));
    assert!(validate(&form("Ana", " Ana@SQQuimica.com ", "x"), TEST_DOMAIN).is_ok());
}

#[tokio::test]
async fn invalid_form_makes_no_provider_call() {
    let h = harness();
    let provider = h.directory.connect();
    let err = h.register(provider.as_ref(), &form("Ana", "ana@gmail.com", "secret1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(provider.current().is_none());
}

#[tokio::test]
async fn registers_profile_and_sends_verification() {
    let h = harness();
    let provider = h.directory.connect();
    let outcome = h.register(provider.as_ref(), &form(" Ana Souza ", "ana@sqquimica.com", "secret1")).await.unwrap();

    assert!(outcome.verification_sent);
    assert_eq!(outcome.error, None);
    let doc = h.store.read_one("users", &outcome.uid).await.unwrap().unwrap();
    assert_eq!(doc.str_field("name"), Some("Ana Souza"));
    assert_eq!(doc.str_field("role"), Some("user"));
    assert_eq!(doc.bool_field("emailVerified"), Some(false));
    assert_eq!(provider.current().unwrap().display_name.as_deref(), Some("Ana Souza"));
    let outbox = h.directory.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].kind, EmailKind::Verification);
}

#[tokio::test]
async fn verification_is_retried_once() {
    let h = harness();
    let flaky = FlakyMail { inner: h.directory.connect(), failures: AtomicUsize::new(1) };
    let outcome = h.register(&flaky, &form("Ana", "ana@sqquimica.com", "secret1")).await.unwrap();
    assert!(outcome.verification_sent);
    assert_eq!(h.directory.outbox().len(), 1);
}

#[tokio::test]
async fn second_failure_is_reported_not_raised() {
    let h = harness();
    let flaky = FlakyMail { inner: h.directory.connect(), failures: AtomicUsize::new(2) };
    let outcome = h.register(&flaky, &form("Ana", "ana@sqquimica.com", "secret1")).await.unwrap();
    assert!(!outcome.verification_sent);
    assert!(outcome.error.unwrap().contains("smtp timeout"));
    assert!(h.store.read_one("users", &outcome.uid).await.unwrap().is_some());
}

#[tokio::test]
async fn duplicate_email_is_a_provider_error() {
    let h = harness();
    let first = h.directory.connect();
    h.register(first.as_ref(), &form("Ana", "ana@sqquimica.com", "secret1")).await.unwrap();
    let second = h.directory.connect();
    let err = h.register(second.as_ref(), &form("Ana", "ana@sqquimica.com", "secret1")).await.unwrap_err();
    assert!(matches!(err, RegistrationError::Identity(IdentityError::EmailExists)));
}
