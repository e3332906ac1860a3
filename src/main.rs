mod config;
mod db;
mod error;
mod guard;
mod identity;
mod role;
mod routes;
mod services;
mod session;
mod state;
mod store;
mod subscription;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use config::{Config, IdentityBackend};
use identity::IdentityConnector;
use identity::firebase::FirebaseConnector;
use identity::memory::MemoryIdentityDirectory;
use store::DocumentStore;
use store::memory::MemoryStore;
use store::postgres::PgDocumentStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env().expect("invalid configuration");
    let port = config.port;

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgDocumentStore::connect(pool).await.expect("document change listener failed"))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory document store");
            Arc::new(MemoryStore::new())
        }
    };

    let identity: Arc<dyn IdentityConnector> = match &config.identity {
        IdentityBackend::Firebase { api_key, timeout } => {
            Arc::new(FirebaseConnector::new(api_key, *timeout).expect("identity client init failed"))
        }
        IdentityBackend::Memory => {
            tracing::warn!("identity backend is in-memory; accounts do not survive restarts");
            Arc::new(MemoryIdentityDirectory::new())
        }
    };

    let idle_ttl = config.session_idle_ttl;
    let state = state::AppState::new(config, store, identity);

    // Evict client sessions nobody has used for a while.
    let _sweeper = session::registry::spawn_sweeper(state.sessions.clone(), idle_ttl);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "comex-updates listening");
    axum::serve(listener, app).await.expect("server failed");
}
