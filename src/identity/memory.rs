//! In-process identity provider.
//!
//! Accounts live in a shared `MemoryIdentityDirectory`; each client session
//! gets its own `MemoryIdentityProvider` tracking the signed-in identity.
//! Outgoing emails are logged instead of being delivered. Under test they
//! are also kept in an outbox, and `confirm_email` stands in for the user
//! clicking the verification link.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use super::{Identity, IdentityConnector, IdentityError, IdentityProvider, Persistence, SessionNotifier, normalize_email};
use crate::session::registry::bytes_to_hex;
use crate::subscription::{Listener, Subscription};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub kind: EmailKind,
    pub to: String,
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
    email_verified: bool,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: Some(self.email.clone()),
            display_name: self.display_name.clone(),
            email_verified: self.email_verified,
        }
    }
}

#[derive(Default)]
struct DirectoryInner {
    /// Accounts keyed by normalized email.
    accounts: Mutex<HashMap<String, Account>>,
    #[cfg(test)]
    outbox: Mutex<Vec<OutboundEmail>>,
}

/// Shared account directory. Cloning shares the same accounts.
#[derive(Clone, Default)]
pub struct MemoryIdentityDirectory {
    inner: Arc<DirectoryInner>,
}

fn hash_password(password: &str) -> String {
    bytes_to_hex(&Sha256::digest(password.as_bytes()))
}

impl MemoryIdentityDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_accounts<R>(&self, f: impl FnOnce(&mut HashMap<String, Account>) -> R) -> R {
        let mut accounts = self.inner.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut accounts)
    }

    fn find_by_uid(&self, uid: &str) -> Option<Account> {
        self.with_accounts(|accounts| accounts.values().find(|a| a.uid == uid).cloned())
    }

    fn record_email(&self, kind: EmailKind, to: &str) {
        info!(?kind, %to, "memory identity: email not delivered");
        #[cfg(test)]
        self.inner
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(OutboundEmail { kind, to: to.to_owned() });
    }

    /// Mark the account's email verified. Returns `false` if unknown.
    #[cfg(test)]
    pub fn confirm_email(&self, email: &str) -> bool {
        let Some(email) = normalize_email(email) else {
            return false;
        };
        self.with_accounts(|accounts| {
            accounts
                .get_mut(&email)
                .map(|account| account.email_verified = true)
                .is_some()
        })
    }

    /// Emails sent so far, oldest first.
    #[cfg(test)]
    #[must_use]
    pub fn outbox(&self) -> Vec<OutboundEmail> {
        self.inner.outbox.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IdentityConnector for MemoryIdentityDirectory {
    fn connect(&self) -> Arc<dyn IdentityProvider> {
        Arc::new(MemoryIdentityProvider::new(self.clone()))
    }
}

/// Per-session provider over a [`MemoryIdentityDirectory`].
pub struct MemoryIdentityProvider {
    directory: MemoryIdentityDirectory,
    notifier: SessionNotifier,
    persistence: Mutex<Persistence>,
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new(directory: MemoryIdentityDirectory) -> Self {
        Self { directory, notifier: SessionNotifier::new(), persistence: Mutex::new(Persistence::default()) }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let email = normalize_email(email).ok_or(IdentityError::InvalidEmail)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let identity = self.directory.with_accounts(|accounts| {
            if accounts.contains_key(&email) {
                return Err(IdentityError::EmailExists);
            }
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                email: email.clone(),
                password_hash: hash_password(password),
                display_name: None,
                email_verified: false,
            };
            let identity = account.identity();
            accounts.insert(email.clone(), account);
            Ok(identity)
        })?;
        info!(uid = %identity.uid, "memory identity: account created");
        self.notifier.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str, persistence: Persistence) -> Result<Identity, IdentityError> {
        self.set_persistence(persistence);
        let email = normalize_email(email).ok_or(IdentityError::InvalidEmail)?;
        let identity = self.directory.with_accounts(|accounts| {
            accounts
                .get(&email)
                .filter(|account| account.password_hash == hash_password(password))
                .map(Account::identity)
                .ok_or(IdentityError::InvalidCredentials)
        })?;
        self.notifier.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.notifier.publish(None);
        Ok(())
    }

    async fn send_verification_email(&self, identity: &Identity) -> Result<(), IdentityError> {
        let account = self.directory.find_by_uid(&identity.uid).ok_or(IdentityError::NoCurrentUser)?;
        self.directory.record_email(EmailKind::Verification, &account.email);
        Ok(())
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, IdentityError> {
        let fresh = self
            .directory
            .find_by_uid(&identity.uid)
            .ok_or(IdentityError::NoCurrentUser)?
            .identity();
        self.notifier.update_silently(fresh.clone());
        Ok(fresh)
    }

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<Identity, IdentityError> {
        let updated = self.directory.with_accounts(|accounts| {
            accounts
                .values_mut()
                .find(|a| a.uid == identity.uid)
                .map(|account| {
                    account.display_name = Some(name.to_owned());
                    account.identity()
                })
                .ok_or(IdentityError::NoCurrentUser)
        })?;
        self.notifier.update_silently(updated.clone());
        Ok(updated)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let email = normalize_email(email).ok_or(IdentityError::InvalidEmail)?;
        // Unknown addresses are accepted silently so the endpoint does not
        // reveal which emails are registered.
        if self.directory.with_accounts(|accounts| accounts.contains_key(&email)) {
            self.directory.record_email(EmailKind::PasswordReset, &email);
        }
        Ok(())
    }

    fn set_persistence(&self, mode: Persistence) {
        *self.persistence.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    fn persistence(&self) -> Persistence {
        *self.persistence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Identity> {
        self.notifier.current()
    }

    fn on_session_change(&self, listener: Listener<Option<Identity>>) -> Subscription {
        self.notifier.subscribe(listener)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
