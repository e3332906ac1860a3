//! Profile record reconciliation and live profile subscription.
//!
//! `reconcile` makes sure `users/{uid}` exists and mirrors the provider's
//! verified flag, then returns the values the session should show. It never
//! fails: read or write errors are logged and identity-derived values are
//! used instead. A second reconciliation with nothing changed performs no
//! writes.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::identity::Identity;
use crate::role::Role;
use crate::store::collections::USERS;
use crate::store::rules::StoreAccess;
use crate::store::{Document, Fields, StoreError, server_timestamp, watch};
use crate::subscription::{Listener, Subscription, listener};

/// Application-side view of a user's profile record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub uid: String,
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    pub email_verified: bool,
}

impl Profile {
    /// Values used when the record cannot be read or written.
    #[must_use]
    pub fn fallback(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            name: fallback_name(identity),
            role: Role::User,
            email_verified: false,
        }
    }

    /// Build from a stored record. Missing fields fall back to the identity;
    /// unknown role strings count as `user`.
    #[must_use]
    pub fn from_document(identity: &Identity, doc: &Document) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: doc.str_field("email").map(str::to_owned).or_else(|| identity.email.clone()),
            name: doc.str_field("name").map_or_else(|| fallback_name(identity), str::to_owned),
            role: doc.str_field("role").and_then(Role::from_str).unwrap_or_default(),
            email_verified: doc.bool_field("emailVerified").unwrap_or(false),
        }
    }
}

fn fallback_name(identity: &Identity) -> String {
    identity
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .or(identity.email.as_deref())
        .unwrap_or_default()
        .to_owned()
}

/// Initial record for a user seen for the first time.
#[must_use]
pub fn new_profile_fields(identity: &Identity, name: Option<&str>) -> Fields {
    let name = name.map_or_else(|| fallback_name(identity), str::to_owned);
    let mut fields = Fields::new();
    fields.insert("uid".into(), Value::String(identity.uid.clone()));
    fields.insert("email".into(), identity.email.clone().map_or(Value::Null, Value::String));
    fields.insert("name".into(), Value::String(name));
    fields.insert("role".into(), Value::String(Role::User.as_str().to_owned()));
    fields.insert("emailVerified".into(), Value::Bool(false));
    fields.insert("createdAt".into(), server_timestamp());
    fields.insert("updatedAt".into(), server_timestamp());
    fields
}

#[derive(Clone)]
pub struct ProfileSynchronizer {
    access: StoreAccess,
}

impl ProfileSynchronizer {
    #[must_use]
    pub fn new(access: StoreAccess) -> Self {
        Self { access }
    }

    pub async fn reconcile(&self, identity: &Identity) -> Profile {
        let store = self.access.as_user(Some(&identity.uid));
        let uid = identity.uid.as_str();

        let mut profile = match store.read_one(USERS, uid).await {
            Ok(Some(doc)) => Profile::from_document(identity, &doc),
            Ok(None) => match store.create_one(USERS, uid, new_profile_fields(identity, None)).await {
                Ok(true) => {
                    debug!(%uid, "profile created");
                    Profile::fallback(identity)
                }
                // Someone else (registration) created it first; keep theirs.
                Ok(false) => match store.read_one(USERS, uid).await {
                    Ok(Some(doc)) => Profile::from_document(identity, &doc),
                    Ok(None) => Profile::fallback(identity),
                    Err(e) => {
                        warn!(%uid, error = %e, "profile re-read failed");
                        return Profile::fallback(identity);
                    }
                },
                Err(e) => {
                    warn!(%uid, error = %e, "profile create failed");
                    return Profile::fallback(identity);
                }
            },
            Err(e) => {
                warn!(%uid, error = %e, "profile read failed");
                return Profile::fallback(identity);
            }
        };

        if identity.email_verified && !profile.email_verified {
            let mut update = Fields::new();
            update.insert("emailVerified".into(), Value::Bool(true));
            update.insert("updatedAt".into(), server_timestamp());
            match store.write_one(USERS, uid, update, true).await {
                Ok(()) => profile.email_verified = true,
                Err(e) => warn!(%uid, error = %e, "verified flag update failed"),
            }
        }
        profile
    }

    /// Live updates of the profile record. Read failures are logged and the
    /// listener keeps its last known values.
    pub fn subscribe(&self, identity: &Identity, on_profile: Listener<Profile>) -> Subscription {
        let store = self.access.as_user(Some(&identity.uid));
        let uid = identity.uid.clone();
        let identity = identity.clone();
        watch::subscribe_one(
            store,
            USERS,
            &uid,
            listener(move |snapshot: Result<Option<Document>, StoreError>| match snapshot {
                Ok(Some(doc)) => on_profile(Profile::from_document(&identity, &doc)),
                Ok(None) => debug!(uid = %identity.uid, "profile record absent"),
                Err(e) => warn!(uid = %identity.uid, error = %e, "profile subscription error"),
            }),
        )
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
