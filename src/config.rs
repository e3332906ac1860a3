//! Runtime configuration from environment variables.
//!
//! `.env` is loaded by `main` before `Config::from_env`. Every key has a
//! default except `FIREBASE_API_KEY`, which is required when the Firebase
//! identity backend is selected.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CORPORATE_EMAIL_DOMAIN: &str = "sqquimica.com";
const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 60 * 60 * 12;
const DEFAULT_SESSION_READY_WAIT_MS: u64 = 1500;
const DEFAULT_DURABLE_SESSION_DAYS: i64 = 30;
const DEFAULT_UPCOMING_WINDOW_DAYS: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityBackend {
    Firebase { api_key: String, timeout: Duration },
    /// In-process accounts; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub identity: IdentityBackend,
    /// Lowercased, without the leading `@`.
    pub corporate_domain: String,
    pub cookie_secure: bool,
    pub session_idle_ttl: Duration,
    pub session_ready_wait: Duration,
    pub durable_session: time::Duration,
    pub upcoming_window_days: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FIREBASE_API_KEY is required when IDENTITY_BACKEND=firebase")]
    MissingApiKey,
    #[error("unknown IDENTITY_BACKEND: {0}")]
    UnknownBackend(String),
}

fn env_bool(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `raw`, falling back to `default` when absent or malformed.
fn env_parse<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown identity backend or a missing
    /// Firebase API key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let api_key = get("FIREBASE_API_KEY");
        let backend = get("IDENTITY_BACKEND").map(|v| v.to_ascii_lowercase());
        let identity = match backend.as_deref() {
            Some("memory") => IdentityBackend::Memory,
            // Firebase is the default whenever a key is present.
            Some("firebase") | None => match (api_key, backend.is_some()) {
                (Some(api_key), _) => IdentityBackend::Firebase {
                    api_key,
                    timeout: Duration::from_secs(env_parse(get("IDENTITY_TIMEOUT_SECS"), DEFAULT_IDENTITY_TIMEOUT_SECS)),
                },
                (None, true) => return Err(ConfigError::MissingApiKey),
                (None, false) => IdentityBackend::Memory,
            },
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_owned())),
        };

        let corporate_domain = get("CORPORATE_EMAIL_DOMAIN")
            .unwrap_or_else(|| DEFAULT_CORPORATE_EMAIL_DOMAIN.to_owned())
            .trim_start_matches('@')
            .to_ascii_lowercase();

        let durable_days = env_parse(get("DURABLE_SESSION_DAYS"), DEFAULT_DURABLE_SESSION_DAYS);

        Ok(Self {
            port: env_parse(get("PORT"), DEFAULT_PORT),
            database_url: get("DATABASE_URL"),
            db_max_connections: env_parse(get("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS),
            identity,
            corporate_domain,
            cookie_secure: env_bool(get("COOKIE_SECURE").as_deref()).unwrap_or(false),
            session_idle_ttl: Duration::from_secs(env_parse(get("SESSION_IDLE_TTL_SECS"), DEFAULT_SESSION_IDLE_TTL_SECS)),
            session_ready_wait: Duration::from_millis(env_parse(get("SESSION_READY_WAIT_MS"), DEFAULT_SESSION_READY_WAIT_MS)),
            durable_session: time::Duration::days(durable_days),
            upcoming_window_days: env_parse(get("UPCOMING_WINDOW_DAYS"), DEFAULT_UPCOMING_WINDOW_DAYS),
        })
    }

    /// Defaults with the in-memory identity backend.
    #[must_use]
    pub fn local() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            identity: IdentityBackend::Memory,
            corporate_domain: DEFAULT_CORPORATE_EMAIL_DOMAIN.to_owned(),
            cookie_secure: false,
            session_idle_ttl: Duration::from_secs(DEFAULT_SESSION_IDLE_TTL_SECS),
            session_ready_wait: Duration::from_millis(DEFAULT_SESSION_READY_WAIT_MS),
            durable_session: time::Duration::days(DEFAULT_DURABLE_SESSION_DAYS),
            upcoming_window_days: DEFAULT_UPCOMING_WINDOW_DAYS,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
