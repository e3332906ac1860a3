//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the configuration, the rule-checked store access, the identity
//! connector used to give every client session its own provider client,
//! and the registry of live client sessions.

use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityConnector;
use crate::session::profile::ProfileSynchronizer;
use crate::session::registry::SessionRegistry;
use crate::store::DocumentStore;
use crate::store::rules::{Rules, StoreAccess};

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub access: StoreAccess,
    pub identity: Arc<dyn IdentityConnector>,
    pub sessions: SessionRegistry,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityConnector>) -> Self {
        let access = StoreAccess::new(store, Rules::new(&config.corporate_domain));
        Self { config: Arc::new(config), access, identity, sessions: SessionRegistry::new() }
    }

    #[must_use]
    pub fn profiles(&self) -> ProfileSynchronizer {
        ProfileSynchronizer::new(self.access.clone())
    }
}
