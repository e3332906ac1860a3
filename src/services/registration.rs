//! Account registration with corporate-domain email verification.
//!
//! Validation runs before any provider call. After the account exists the
//! remaining steps are best-effort: display name, profile record, then the
//! verification email (retried once). The outcome tells the UI whether the
//! email went out so it can keep showing the "check your email" state.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::identity::{Identity, IdentityError, IdentityProvider};
use crate::session::profile::new_profile_fields;
use crate::store::DocumentStore;
use crate::store::collections::USERS;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub uid: String,
    pub verification_sent: bool,
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("use your corporate email (@{0})")]
    InvalidDomain(String),
    #[error("name is required")]
    MissingName,
    #[error("password is required")]
    MissingPassword,
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl RegistrationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDomain(_) | Self::MissingName | Self::MissingPassword => ErrorKind::Validation,
            Self::Identity(e) => e.kind(),
        }
    }
}

/// Check the form before calling the provider.
///
/// # Errors
///
/// Returns the first failing rule: email domain, name, password.
pub fn validate(form: &Registration, corporate_domain: &str) -> Result<(), RegistrationError> {
    let email = form.email.trim().to_ascii_lowercase();
    if !email.ends_with(&format!("@{corporate_domain}")) {
        return Err(RegistrationError::InvalidDomain(corporate_domain.to_owned()));
    }
    if form.name.trim().is_empty() {
        return Err(RegistrationError::MissingName);
    }
    if form.password.is_empty() {
        return Err(RegistrationError::MissingPassword);
    }
    Ok(())
}

/// Send the verification email, retrying once.
///
/// # Errors
///
/// Returns the provider error of the second attempt.
pub async fn send_verification(provider: &dyn IdentityProvider, identity: &Identity) -> Result<(), IdentityError> {
    if let Err(e) = provider.send_verification_email(identity).await {
        warn!(uid = %identity.uid, error = %e, "verification email failed; retrying once");
        provider.send_verification_email(identity).await?;
    }
    Ok(())
}

/// Register a new account. `store` must act as the new user; pass a
/// factory since the uid is only known after account creation.
///
/// # Errors
///
/// Returns validation errors, or the provider error if account creation
/// fails. Later failures are reported in the outcome.
pub async fn register<F>(
    provider: &dyn IdentityProvider,
    store_for: F,
    form: &Registration,
    corporate_domain: &str,
) -> Result<RegistrationOutcome, RegistrationError>
where
    F: FnOnce(&str) -> std::sync::Arc<dyn DocumentStore>,
{
    validate(form, corporate_domain)?;
    let name = form.name.trim();
    let identity = provider.create_account(form.email.trim(), &form.password).await?;
    info!(uid = %identity.uid, "account registered");

    let identity = match provider.update_display_name(&identity, name).await {
        Ok(updated) => updated,
        Err(e) => {
            warn!(uid = %identity.uid, error = %e, "display name update failed");
            identity
        }
    };

    // Merge so a concurrent first-sign-in reconciliation keeps the name.
    let store = store_for(&identity.uid);
    if let Err(e) = store.write_one(USERS, &identity.uid, new_profile_fields(&identity, Some(name)), true).await {
        warn!(uid = %identity.uid, error = %e, "profile write after registration failed");
    }

    let (verification_sent, error) = match send_verification(provider, &identity).await {
        Ok(()) => (true, None),
        Err(e) => {
            warn!(uid = %identity.uid, error = %e, "verification email not sent");
            (false, Some(e.to_string()))
        }
    };
    Ok(RegistrationOutcome { uid: identity.uid, verification_sent, error })
}

#[cfg(test)]
#[path = "registration_test.rs"]
mod tests;
