//! Per-client session store.
//!
//! ARCHITECTURE
//! ============
//! A `SessionStore` observes one identity provider for its whole lifetime.
//! Provider notifications are queued on a channel and handled by a single
//! driver task, strictly in order:
//!
//! - signed in: mark loading, drop the previous profile subscription,
//!   refresh the identity (awaited), reconcile the profile record, publish,
//!   then start a live profile subscription;
//! - signed out: drop the profile subscription and publish the empty state.
//!
//! Readers get `SessionSnapshot`s from a `watch` channel. Live profile
//! updates only apply while the snapshot still belongs to the same uid.

pub mod profile;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::guard::GuardState;
use crate::identity::{Identity, IdentityProvider};
use crate::role::Role;
use crate::subscription::{Subscription, listener};
use profile::{Profile, ProfileSynchronizer};

/// What the UI shows about the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self { identity: None, profile: None, loading: true }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { identity: None, profile: None, loading: false }
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }

    /// Role from the profile record; `user` while unknown.
    #[must_use]
    pub fn role(&self) -> Role {
        self.profile.as_ref().map(|p| p.role).unwrap_or_default()
    }

    #[must_use]
    pub fn guard_state(&self) -> GuardState {
        GuardState {
            loading: self.loading,
            signed_in: self.identity.is_some(),
            verified: self.identity.as_ref().is_some_and(|i| i.email_verified),
        }
    }

    /// Profile name, then email.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(profile) = self.profile.as_ref().filter(|p| !p.name.is_empty()) {
            return Some(profile.name.clone());
        }
        self.identity.as_ref().and_then(|i| i.email.clone())
    }
}

enum Command {
    SessionChanged(Option<Identity>),
    Refresh(oneshot::Sender<SessionSnapshot>),
}

pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Receiver<SessionSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
    driver: JoinHandle<()>,
    _provider_subscription: Subscription,
}

impl SessionStore {
    #[must_use]
    pub fn start(provider: Arc<dyn IdentityProvider>, sync: ProfileSynchronizer) -> Self {
        let (state_tx, state) = watch::channel(SessionSnapshot::initial());
        let (commands, rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(
            Driver { provider: provider.clone(), sync, state: Arc::new(state_tx), profile_subscription: None }.run(rx),
        );

        let subscription = provider.on_session_change(listener({
            let commands = commands.clone();
            move |identity: Option<Identity>| {
                let _ = commands.send(Command::SessionChanged(identity));
            }
        }));

        Self { provider, state, commands, driver, _provider_subscription: subscription }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Wait up to `timeout` for loading to finish, then return the snapshot
    /// (possibly still loading).
    pub async fn wait_ready(&self, timeout: Duration) -> SessionSnapshot {
        let mut rx = self.state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|s| !s.loading)).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => self.snapshot(),
        }
    }

    /// Wait until the published snapshot belongs to `uid` (`None` for signed
    /// out) and is no longer loading.
    pub async fn wait_settled(&self, uid: Option<&str>, timeout: Duration) -> SessionSnapshot {
        let mut rx = self.state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|s| !s.loading && s.uid() == uid)).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => self.snapshot(),
        }
    }

    /// Re-read the identity from the provider and reconcile the profile again.
    pub async fn refresh_user(&self) -> SessionSnapshot {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Refresh(tx)).is_err() {
            return self.snapshot();
        }
        rx.await.unwrap_or_else(|_| self.snapshot())
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        // Aborting drops the driver, and with it the profile subscription.
        self.driver.abort();
    }
}

struct Driver {
    provider: Arc<dyn IdentityProvider>,
    sync: ProfileSynchronizer,
    state: Arc<watch::Sender<SessionSnapshot>>,
    profile_subscription: Option<Subscription>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::SessionChanged(Some(identity)) => self.signed_in(identity).await,
                Command::SessionChanged(None) => self.signed_out(),
                Command::Refresh(reply) => {
                    match self.provider.current() {
                        Some(identity) => self.signed_in(identity).await,
                        None => self.signed_out(),
                    }
                    let _ = reply.send(self.state.borrow().clone());
                }
            }
        }
    }

    async fn signed_in(&mut self, identity: Identity) {
        self.state.send_modify(|s| s.loading = true);
        self.profile_subscription = None;

        let identity = match self.provider.refresh(&identity).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "identity refresh failed; using cached state");
                identity
            }
        };
        let profile = self.sync.reconcile(&identity).await;
        debug!(uid = %identity.uid, role = %profile.role, verified = identity.email_verified, "session ready");

        self.state.send_replace(SessionSnapshot {
            identity: Some(identity.clone()),
            profile: Some(profile),
            loading: false,
        });

        let state = self.state.clone();
        let uid = identity.uid.clone();
        self.profile_subscription = Some(self.sync.subscribe(
            &identity,
            listener(move |profile: Profile| {
                state.send_if_modified(|s| {
                    if s.uid() != Some(uid.as_str()) || s.profile.as_ref() == Some(&profile) {
                        return false;
                    }
                    s.profile = Some(profile);
                    true
                });
            }),
        ));
    }

    fn signed_out(&mut self) {
        self.profile_subscription = None;
        self.state.send_replace(SessionSnapshot::signed_out());
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
