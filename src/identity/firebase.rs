//! Firebase Authentication adapter (Identity Toolkit REST API).
//!
//! DESIGN
//! ======
//! Each client session holds its own ID/refresh token pair. ID tokens are
//! refreshed through the Secure Token endpoint shortly before they expire, so
//! `refresh` and other token-bearing calls never send a stale token.
//!
//! ERROR HANDLING
//! ==============
//! Firebase reports failures as `{"error": {"message": "EMAIL_EXISTS"}}`.
//! `classify_error` maps those codes onto `IdentityError`; transport errors
//! become `IdentityError::Network`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{Identity, IdentityConnector, IdentityError, IdentityProvider, Persistence, SessionNotifier};
use crate::subscription::{Listener, Subscription};

pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh ID tokens this long before their reported expiry.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Map a Firebase error code (e.g. `"WEAK_PASSWORD : Password should be..."`)
/// onto the identity error taxonomy.
#[must_use]
pub fn classify_error(message: &str) -> IdentityError {
    let (code, detail) = match message.split_once(':') {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (message.trim(), ""),
    };
    match code {
        "EMAIL_EXISTS" => IdentityError::EmailExists,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => IdentityError::InvalidCredentials,
        "INVALID_EMAIL" | "MISSING_EMAIL" => IdentityError::InvalidEmail,
        "WEAK_PASSWORD" => IdentityError::WeakPassword(detail.to_owned()),
        "USER_DISABLED" => IdentityError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyAttempts,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "INVALID_REFRESH_TOKEN" => {
            IdentityError::NoCurrentUser
        }
        other => IdentityError::Rejected(other.to_owned()),
    }
}

fn parse_expiry(expires_in: Option<&str>) -> Instant {
    let secs = expires_in
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_SLACK)
}

// =============================================================================
// CONNECTOR
// =============================================================================

#[derive(Clone)]
pub struct FirebaseConnector {
    http: reqwest::Client,
    api_key: Arc<str>,
    toolkit_url: Arc<str>,
    token_url: Arc<str>,
}

impl FirebaseConnector {
    /// Build a connector for the given web API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, IdentityError> {
        Self::with_endpoints(api_key, timeout, DEFAULT_IDENTITY_TOOLKIT_URL, DEFAULT_SECURE_TOKEN_URL)
    }

    /// Build a connector against custom endpoints (e.g. the auth emulator).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoints(
        api_key: &str,
        timeout: Duration,
        toolkit_url: &str,
        token_url: &str,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            toolkit_url: toolkit_url.trim_end_matches('/').into(),
            token_url: token_url.into(),
        })
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, body: &serde_json::Value) -> Result<T, IdentityError> {
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_ref())])
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| IdentityError::Network(format!("malformed response: {e}")));
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => Err(classify_error(&envelope.error.message)),
            Err(_) if status.is_server_error() => Err(IdentityError::Network(format!("HTTP {status}"))),
            Err(_) => Err(IdentityError::Rejected(format!("HTTP {status}"))),
        }
    }

    async fn accounts(&self, method: &str, body: &serde_json::Value) -> Result<serde_json::Value, IdentityError> {
        let url = format!("{}/accounts:{method}", self.toolkit_url);
        self.post(&url, body).await
    }
}

impl IdentityConnector for FirebaseConnector {
    fn connect(&self) -> Arc<dyn IdentityProvider> {
        Arc::new(FirebaseIdentityProvider {
            connector: self.clone(),
            tokens: Mutex::new(None),
            notifier: SessionNotifier::new(),
            persistence: Mutex::new(Persistence::default()),
        })
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

#[derive(Clone)]
struct Tokens {
    uid: String,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

pub struct FirebaseIdentityProvider {
    connector: FirebaseConnector,
    tokens: Mutex<Option<Tokens>>,
    notifier: SessionNotifier,
    persistence: Mutex<Persistence>,
}

impl FirebaseIdentityProvider {
    fn stored_tokens(&self) -> Option<Tokens> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store_tokens(&self, tokens: Option<Tokens>) {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    /// Return a valid ID token for `uid`, refreshing it if close to expiry.
    async fn id_token(&self, uid: &str) -> Result<String, IdentityError> {
        let tokens = self
            .stored_tokens()
            .filter(|t| t.uid == uid)
            .ok_or(IdentityError::NoCurrentUser)?;
        if Instant::now() < tokens.expires_at {
            return Ok(tokens.id_token);
        }

        debug!(%uid, "refreshing firebase id token");
        let body = json!({ "grant_type": "refresh_token", "refresh_token": tokens.refresh_token });
        let refreshed: TokenResponse = self.connector.post(&self.connector.token_url, &body).await?;
        let id_token = refreshed.id_token.clone();
        self.store_tokens(Some(Tokens {
            uid: tokens.uid,
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            expires_at: parse_expiry(refreshed.expires_in.as_deref()),
        }));
        Ok(id_token)
    }

    async fn lookup(&self, id_token: &str) -> Result<Identity, IdentityError> {
        let value = self.connector.accounts("lookup", &json!({ "idToken": id_token })).await?;
        let response: LookupResponse =
            serde_json::from_value(value).map_err(|e| IdentityError::Network(format!("malformed lookup: {e}")))?;
        let user = response.users.into_iter().next().ok_or(IdentityError::NoCurrentUser)?;
        Ok(Identity {
            uid: user.local_id,
            email: user.email,
            display_name: user.display_name,
            email_verified: user.email_verified,
        })
    }

    /// Store tokens from a sign-up/sign-in response and build the identity.
    async fn establish(&self, value: serde_json::Value) -> Result<Identity, IdentityError> {
        let auth: AuthResponse =
            serde_json::from_value(value).map_err(|e| IdentityError::Network(format!("malformed auth: {e}")))?;
        self.store_tokens(Some(Tokens {
            uid: auth.local_id.clone(),
            id_token: auth.id_token.clone(),
            refresh_token: auth.refresh_token,
            expires_at: parse_expiry(auth.expires_in.as_deref()),
        }));
        let identity = match self.lookup(&auth.id_token).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, uid = %auth.local_id, "firebase lookup after sign-in failed");
                Identity {
                    uid: auth.local_id,
                    email: auth.email,
                    display_name: auth.display_name,
                    email_verified: false,
                }
            }
        };
        self.notifier.publish(Some(identity.clone()));
        Ok(identity)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let body = PasswordRequest { email, password, return_secure_token: true };
        let body = serde_json::to_value(body).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        let value = self.connector.accounts("signUp", &body).await?;
        self.establish(value).await
    }

    async fn sign_in(&self, email: &str, password: &str, persistence: Persistence) -> Result<Identity, IdentityError> {
        self.set_persistence(persistence);
        let body = PasswordRequest { email, password, return_secure_token: true };
        let body = serde_json::to_value(body).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        let value = self.connector.accounts("signInWithPassword", &body).await?;
        self.establish(value).await
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.store_tokens(None);
        self.notifier.publish(None);
        Ok(())
    }

    async fn send_verification_email(&self, identity: &Identity) -> Result<(), IdentityError> {
        let id_token = self.id_token(&identity.uid).await?;
        self.connector
            .accounts("sendOobCode", &json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }))
            .await?;
        Ok(())
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, IdentityError> {
        let id_token = self.id_token(&identity.uid).await?;
        let fresh = self.lookup(&id_token).await?;
        self.notifier.update_silently(fresh.clone());
        Ok(fresh)
    }

    async fn update_display_name(&self, identity: &Identity, name: &str) -> Result<Identity, IdentityError> {
        let id_token = self.id_token(&identity.uid).await?;
        self.connector
            .accounts("update", &json!({ "idToken": id_token, "displayName": name, "returnSecureToken": false }))
            .await?;
        let updated = Identity { display_name: Some(name.to_owned()), ..identity.clone() };
        self.notifier.update_silently(updated.clone());
        Ok(updated)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        self.connector
            .accounts("sendOobCode", &json!({ "requestType": "PASSWORD_RESET", "email": email }))
            .await?;
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
#[path = "firebase_test.rs"]
mod tests;
