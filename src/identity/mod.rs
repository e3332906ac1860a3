//! Identity provider boundary.
//!
//! ARCHITECTURE
//! ============
//! An `IdentityProvider` is the per-client-session auth object: it tracks
//! the current identity, performs account operations and notifies listeners
//! when the signed-in identity changes. An `IdentityConnector` creates one
//! provider per client session.
//!
//! Adapters: `firebase` (Identity Toolkit REST API) and `memory`
//! (in-process accounts for tests and local development).

pub mod firebase;
pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ErrorKind;
use crate::subscription::{Gate, Listener, Subscription};

// =============================================================================
// TYPES
// =============================================================================

/// An authenticated end-user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
}

/// How long a sign-in should survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Survives browser restarts ("remember me").
    Durable,
    /// Ends with the browser session.
    #[default]
    TabScoped,
}

impl Persistence {
    #[must_use]
    pub fn from_remember(remember: bool) -> Self {
        if remember { Self::Durable } else { Self::TabScoped }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailExists,
    #[error("weak password: {0}")]
    WeakPassword(String),
    #[error("invalid email address")]
    InvalidEmail,
    #[error("no signed-in user")]
    NoCurrentUser,
    #[error("account disabled")]
    UserDisabled,
    #[error("too many attempts, try again later")]
    TooManyAttempts,
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Network(String),
}

impl IdentityError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials | Self::EmailExists | Self::WeakPassword(_) | Self::InvalidEmail => {
                ErrorKind::Validation
            }
            Self::NoCurrentUser | Self::UserDisabled | Self::TooManyAttempts | Self::Rejected(_) => {
                ErrorKind::PermissionDenied
            }
            Self::Network(_) => ErrorKind::Network,
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, IdentityError>;

    /// Sign in with the given persistence mode.
    async fn sign_in(&self, email: &str, password: &str, persistence: Persistence) -> Result<Identity, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    async fn send_verification_email(&self, identity: &Identity) -> Result<(), IdentityError>;

    /// Re-read the identity from the provider (verified flag, display name).
    /// Updates the current identity without emitting a session change.
    async fn refresh(&self, identity: &Identity) -> Result<Identity, IdentityError>;

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<Identity, IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    fn set_persistence(&self, mode: Persistence);

    fn persistence(&self) -> Persistence;

    fn current(&self) -> Option<Identity>;

    /// Register a listener for sign-in/sign-out. The listener receives the
    /// current state immediately, then every later change.
    fn on_session_change(&self, listener: Listener<Option<Identity>>) -> Subscription;
}

/// Factory producing one provider per client session.
pub trait IdentityConnector: Send + Sync {
    fn connect(&self) -> Arc<dyn IdentityProvider>;
}

// =============================================================================
// SESSION NOTIFIER
// =============================================================================

/// Current-identity cell with change notification, shared by the adapters.
pub(crate) struct SessionNotifier {
    tx: watch::Sender<Option<Identity>>,
}

impl SessionNotifier {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Publish a sign-in or sign-out.
    pub(crate) fn publish(&self, identity: Option<Identity>) {
        self.tx.send_replace(identity);
    }

    /// Replace the current identity without notifying listeners.
    pub(crate) fn update_silently(&self, identity: Identity) {
        self.tx.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.uid == identity.uid) {
                *current = Some(identity);
            }
            false
        });
    }

    pub(crate) fn subscribe(&self, listener: Listener<Option<Identity>>) -> Subscription {
        let gate = Gate::new();
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn({
            let gate = gate.clone();
            async move {
                let initial = rx.borrow_and_update().clone();
                gate.run(|| listener(initial));
                while rx.changed().await.is_ok() {
                    let value = rx.borrow_and_update().clone();
                    gate.run(|| listener(value));
                }
            }
        });
        Subscription::new(gate).with_task(task)
    }
}

/// Trim and lowercase an email; `None` when it is not shaped like one.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
