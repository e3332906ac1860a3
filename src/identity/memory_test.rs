use super::*;

fn provider() -> (MemoryIdentityDirectory, Arc<dyn IdentityProvider>) {
    let directory = MemoryIdentityDirectory::new();
    let provider = directory.connect();
    (directory, provider)
}

#[tokio::test]
async fn create_account_signs_in_unverified() {
    let (_dir, provider) = provider();
    let identity = provider.create_account("Ana@SQQuimica.com", "secret1").await.unwrap();
    assert_eq!(identity.email.as_deref(), Some("ana@sqquimica.com"));
    assert!(!identity.email_verified);
    assert_eq!(provider.current().map(|i| i.uid), Some(identity.uid));
}

#[tokio::test]
async fn create_account_rejects_duplicates() {
    let (dir, provider) = provider();
    provider.create_account("a@sqquimica.com", "secret1").await.unwrap();
    let other = dir.connect();
    let err = other.create_account("A@sqquimica.com", "secret2").await.unwrap_err();
    assert!(matches!(err, IdentityError::EmailExists));
}

#[tokio::test]
async fn create_account_rejects_short_password() {
    let (_dir, provider) = provider();
    let err = provider.create_account("a@sqquimica.com", "123").await.unwrap_err();
    assert!(matches!(err, IdentityError::WeakPassword(_)));
}

#[tokio::test]
async fn sign_in_checks_password() {
    let (dir, provider) = provider();
    provider.create_account("a@sqquimica.com", "secret1").await.unwrap();

    let session = dir.connect();
    let err = session.sign_in("a@sqquimica.com", "wrong", Persistence::TabScoped).await.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
    assert!(session.current().is_none());

    let identity = session.sign_in("a@sqquimica.com", "secret1", Persistence::Durable).await.unwrap();
    assert_eq!(session.current(), Some(identity));
    assert_eq!(session.persistence(), Persistence::Durable);
}

#[tokio::test]
async fn sessions_are_independent() {
    let (dir, provider) = provider();
    provider.create_account("a@sqquimica.com", "secret1").await.unwrap();
    let other = dir.connect();
    assert!(other.current().is_none());
    provider.sign_out().await.unwrap();
    assert!(provider.current().is_none());
}

#[tokio::test]
async fn refresh_picks_up_confirmation() {
    let (dir, provider) = provider();
    let identity = provider.create_account("a@sqquimica.com", "secret1").await.unwrap();
    assert!(dir.confirm_email("a@sqquimica.com"));

    let fresh = provider.refresh(&identity).await.unwrap();
    assert!(fresh.email_verified);
    assert!(provider.current().unwrap().email_verified);
}

#[tokio::test]
async fn verification_and_reset_land_in_outbox() {
    let (dir, provider) = provider();
    let identity = provider.create_account("a@sqquimica.com", "secret1").await.unwrap();
    provider.send_verification_email(&identity).await.unwrap();
    provider.send_password_reset("a@sqquimica.com").await.unwrap();
    provider.send_password_reset("ghost@sqquimica.com").await.unwrap();

    let outbox = dir.outbox();
    assert_eq!(outbox.len(), 2);
    assert_eq!(outbox[0].kind, EmailKind::Verification);
    assert_eq!(outbox[1].kind, EmailKind::PasswordReset);
    assert_eq!(outbox[1].to, "a@sqquimica.com");
}

#[tokio::test]
async fn update_display_name_is_visible_on_refresh() {
    let (_dir, provider) = provider();
    let identity = provider.create_account("a@sqquimica.com", "secret1").await.unwrap();
    provider.update_display_name(&identity, "Ana").await.unwrap();
    let fresh = provider.refresh(&identity).await.unwrap();
    assert_eq!(fresh.display_name.as_deref(), Some("Ana"));
}

#[test]
fn confirm_unknown_email_is_false() {
    let dir = MemoryIdentityDirectory::new();
    assert!(!dir.confirm_email("nobody@sqquimica.com"));
}

#[test]
fn password_hash_is_sha256_hex() {
    assert_eq!(hash_password("abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
}
