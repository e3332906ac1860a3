//! Client session registry.
//!
//! DESIGN
//! ======
//! Each browser session is keyed by a random token carried in an HttpOnly
//! cookie and owns its own identity provider client and `SessionStore`.
//! Sessions are kept in memory; a sweeper evicts sessions idle longer than
//! the configured TTL, which drops their subscriptions.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use super::SessionStore;
use super::profile::ProfileSynchronizer;
use crate::identity::IdentityConnector;

/// Lowercase hex encoding.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

pub struct ClientSession {
    pub token: String,
    pub store: SessionStore,
    last_seen: Mutex<Instant>,
}

impl ClientSession {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_since(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<ClientSession>>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, token: &str) -> Option<Arc<ClientSession>> {
        let session = self.sessions.read().await.get(token).cloned()?;
        session.touch();
        Some(session)
    }

    /// Start a new client session with its own provider client.
    pub async fn create(&self, connector: &dyn IdentityConnector, sync: ProfileSynchronizer) -> Arc<ClientSession> {
        let token = generate_token();
        let store = SessionStore::start(connector.connect(), sync);
        let session = Arc::new(ClientSession { token: token.clone(), store, last_seen: Mutex::new(Instant::now()) });
        self.sessions.write().await.insert(token, session.clone());
        session
    }

    pub async fn remove(&self, token: &str) -> Option<Arc<ClientSession>> {
        self.sessions.write().await.remove(token)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions last used more than `ttl` before `now`. Returns how
    /// many were evicted.
    pub async fn evict_idle(&self, ttl: Duration, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now.saturating_duration_since(session.idle_since()) <= ttl);
        before - sessions.len()
    }
}

/// Spawn the idle-session sweeper. Returns a handle for shutdown.
pub fn spawn_sweeper(registry: SessionRegistry, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(300));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = registry.evict_idle(ttl, Instant::now()).await;
            if evicted > 0 {
                info!(evicted, "idle client sessions evicted");
            }
        }
    })
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
