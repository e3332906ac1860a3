//! Admin panel: registered users and role management.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::role::{Capability, Role};
use crate::store::collections::USERS;
use crate::store::{Document, DocumentStore, Fields, OrderBy, StoreError, server_timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    pub uid: String,
    /// Profile name, falling back to the email.
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub email_verified: bool,
}

impl UserEntry {
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let email = doc.str_field("email").map(str::to_owned);
        Self {
            uid: doc.id.clone(),
            name: doc
                .str_field("name")
                .map(str::to_owned)
                .or_else(|| email.clone())
                .unwrap_or_default(),
            email,
            role: doc.str_field("role").and_then(Role::from_str).unwrap_or_default(),
            email_verified: doc.bool_field("emailVerified").unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminView {
    pub users: Vec<UserEntry>,
    pub can_manage_roles: bool,
}

#[must_use]
pub fn list_order() -> OrderBy {
    OrderBy::asc("email")
}

#[must_use]
pub fn admin_view(docs: &[Document], role: Role) -> AdminView {
    AdminView {
        users: docs.iter().map(UserEntry::from_document).collect(),
        can_manage_roles: role.can(Capability::ManageRoles),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleChange {
    pub role: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RoleChangeError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("administrators cannot change their own role")]
    SelfChange,
    #[error("user not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoleChangeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownRole(_) | Self::SelfChange => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
        }
    }
}

/// Change another user's role.
///
/// # Errors
///
/// Returns a validation error for an unknown role or a self-change,
/// `NotFound` for an unknown user, or the store error (permission-denied
/// for non-admins).
pub async fn set_role(store: &dyn DocumentStore, actor_uid: &str, target_uid: &str, raw_role: &str) -> Result<Role, RoleChangeError> {
    let role = Role::from_str(raw_role).ok_or_else(|| RoleChangeError::UnknownRole(raw_role.to_owned()))?;
    if actor_uid == target_uid {
        return Err(RoleChangeError::SelfChange);
    }
    if store.read_one(USERS, target_uid).await?.is_none() {
        return Err(RoleChangeError::NotFound(target_uid.to_owned()));
    }
    let mut fields = Fields::new();
    fields.insert("role".into(), Value::String(role.as_str().to_owned()));
    fields.insert("updatedAt".into(), server_timestamp());
    store.write_one(USERS, target_uid, fields, true).await?;
    tracing::info!(%actor_uid, %target_uid, %role, "role changed");
    Ok(role)
}

#[cfg(test)]
#[path = "users_test.rs"]
mod tests;
