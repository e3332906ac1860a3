//! Access rules enforced at the store boundary.
//!
//! DESIGN
//! ======
//! Views hide affordances by role, but the actual enforcement point is here:
//! every request handler talks to the store through a `ScopedStore` bound to
//! the signed-in uid. The actor's role is read from its own profile record on
//! each check, so a role change takes effect on the next operation and a
//! client can never assert its own role.
//!
//! Notable rules: users may create only their own profile, only with role
//! `user` and a corporate email; nobody but an admin can change a role.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use super::collections::{ANNOUNCEMENTS, AUDIT_LOGS, BARRA, PROCESSES, USERS};
use super::{Change, Document, DocumentStore, Fields, OrderBy, StoreError};
use crate::role::{Capability, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    List,
    Create,
    Update,
    Delete,
}

/// The signed-in user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor<'a> {
    pub uid: &'a str,
    pub role: Role,
}

/// One operation to authorize. `before`/`after` are the document fields
/// before and after the write, where applicable.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub op: Operation,
    pub collection: &'a str,
    pub id: Option<&'a str>,
    pub before: Option<&'a Fields>,
    pub after: Option<&'a Fields>,
}

#[derive(Debug, Clone)]
pub struct Rules {
    corporate_domain: Arc<str>,
}

fn deny(req: &Request<'_>, reason: &str) -> Result<(), StoreError> {
    let target = match req.id {
        Some(id) => format!("{}/{id}", req.collection),
        None => req.collection.to_owned(),
    };
    Err(StoreError::PermissionDenied(format!("{:?} {target}: {reason}", req.op).to_lowercase()))
}

fn allow_if(req: &Request<'_>, allowed: bool, reason: &str) -> Result<(), StoreError> {
    if allowed { Ok(()) } else { deny(req, reason) }
}

fn role_field(fields: Option<&Fields>) -> Option<&str> {
    fields.and_then(|f| f.get("role")).and_then(Value::as_str)
}

impl Rules {
    #[must_use]
    pub fn new(corporate_domain: &str) -> Self {
        Self { corporate_domain: corporate_domain.trim_start_matches('@').to_ascii_lowercase().into() }
    }

    #[must_use]
    pub fn corporate_domain(&self) -> &str {
        &self.corporate_domain
    }

    fn corporate_email(&self, fields: Option<&Fields>) -> bool {
        match fields.and_then(|f| f.get("email")) {
            None | Some(Value::Null) => true,
            Some(Value::String(email)) => email
                .trim()
                .to_ascii_lowercase()
                .ends_with(&format!("@{}", self.corporate_domain)),
            Some(_) => false,
        }
    }

    /// Authorize `req` for `actor` (`None` when signed out).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PermissionDenied` naming the operation and reason.
    pub fn check(&self, actor: Option<Actor<'_>>, req: &Request<'_>) -> Result<(), StoreError> {
        let Some(actor) = actor else {
            return deny(req, "sign-in required");
        };
        let role = actor.role;
        let own = req.id == Some(actor.uid);

        match (req.collection, req.op) {
            (USERS, Operation::Read) => allow_if(req, own || role.can(Capability::ListUsers), "not your profile"),
            (USERS, Operation::List) => allow_if(req, role.can(Capability::ListUsers), "requires comex or admin"),
            (USERS, Operation::Create) => {
                if role.can(Capability::ManageRoles) {
                    return Ok(());
                }
                if !own {
                    return deny(req, "profiles can only be created by their owner");
                }
                if !matches!(role_field(req.after), None | Some("user")) {
                    return deny(req, "new profiles must have role user");
                }
                allow_if(req, self.corporate_email(req.after), "email outside the corporate domain")
            }
            (USERS, Operation::Update) => {
                if role.can(Capability::ManageRoles) {
                    return Ok(());
                }
                if !own {
                    return deny(req, "not your profile");
                }
                allow_if(req, role_field(req.before) == role_field(req.after), "role can only be changed by an admin")
            }
            (USERS, Operation::Delete) => deny(req, "profiles are never deleted"),

            (PROCESSES, Operation::Read | Operation::List) => Ok(()),
            (PROCESSES, Operation::Create) => {
                allow_if(req, role.can(Capability::CreateProcess), "requires comex or admin")
            }
            (PROCESSES, Operation::Update) => {
                let owner = req
                    .before
                    .and_then(|f| f.get("owners"))
                    .and_then(Value::as_array)
                    .is_some_and(|owners| owners.iter().any(|o| o.as_str() == Some(actor.uid)));
                allow_if(req, owner || role.can(Capability::EditAnyProcess), "requires owner, comex or admin")
            }
            (PROCESSES, Operation::Delete) => {
                allow_if(req, role.can(Capability::DeleteProcess), "requires comex or admin")
            }

            (ANNOUNCEMENTS | BARRA, Operation::Read | Operation::List) => Ok(()),
            (ANNOUNCEMENTS | BARRA, Operation::Create | Operation::Update | Operation::Delete) => {
                allow_if(req, role.can(Capability::EditAnnouncements), "requires comex or admin")
            }

            (AUDIT_LOGS, Operation::Create) => Ok(()),
            (AUDIT_LOGS, Operation::Read | Operation::List) => {
                allow_if(req, role.can(Capability::ReadAuditLog), "requires admin")
            }
            (AUDIT_LOGS, Operation::Update | Operation::Delete) => deny(req, "audit entries are append-only"),

            _ => deny(req, "unknown collection"),
        }
    }
}

// =============================================================================
// SCOPED STORE
// =============================================================================

/// Hands out per-user views of the underlying store.
#[derive(Clone)]
pub struct StoreAccess {
    inner: Arc<dyn DocumentStore>,
    rules: Rules,
}

impl StoreAccess {
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>, rules: Rules) -> Self {
        Self { inner, rules }
    }

    /// Store view acting as `uid` (`None` for a signed-out visitor).
    #[must_use]
    pub fn as_user(&self, uid: Option<&str>) -> Arc<dyn DocumentStore> {
        Arc::new(ScopedStore { inner: self.inner.clone(), rules: self.rules.clone(), uid: uid.map(str::to_owned) })
    }

    #[must_use]
    pub fn rules(&self) -> &Rules {
        &self.rules
    }
}

pub struct ScopedStore {
    inner: Arc<dyn DocumentStore>,
    rules: Rules,
    uid: Option<String>,
}

impl ScopedStore {
    async fn role(&self, uid: &str) -> Result<Role, StoreError> {
        let profile = self.inner.read_one(USERS, uid).await?;
        Ok(profile
            .as_ref()
            .and_then(|doc| doc.str_field("role"))
            .and_then(Role::from_str)
            .unwrap_or_default())
    }

    async fn authorize(&self, req: Request<'_>) -> Result<(), StoreError> {
        let actor_role = match &self.uid {
            Some(uid) => Some(self.role(uid).await?),
            None => None,
        };
        let actor = self.uid.as_deref().zip(actor_role).map(|(uid, role)| Actor { uid, role });
        self.rules.check(actor, &req)
    }
}

#[async_trait::async_trait]
impl DocumentStore for ScopedStore {
    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.authorize(Request { op: Operation::Read, collection, id: Some(id), before: None, after: None })
            .await?;
        self.inner.read_one(collection, id).await
    }

    async fn write_one(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
        let existing = self.inner.read_one(collection, id).await?;
        let before = existing.as_ref().map(|doc| &doc.fields);
        let after = match (before, merge) {
            (Some(before), true) => {
                let mut merged = before.clone();
                merged.extend(fields.clone());
                merged
            }
            _ => fields.clone(),
        };
        let op = if existing.is_some() { Operation::Update } else { Operation::Create };
        self.authorize(Request { op, collection, id: Some(id), before, after: Some(&after) }).await?;
        self.inner.write_one(collection, id, fields, merge).await
    }

    async fn create_one(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError> {
        self.authorize(Request { op: Operation::Create, collection, id: Some(id), before: None, after: Some(&fields) })
            .await?;
        self.inner.create_one(collection, id, fields).await
    }

    async fn delete_one(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let existing = self.inner.read_one(collection, id).await?;
        let before = existing.as_ref().map(|doc| &doc.fields);
        self.authorize(Request { op: Operation::Delete, collection, id: Some(id), before, after: None })
            .await?;
        self.inner.delete_one(collection, id).await
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.authorize(Request { op: Operation::Create, collection, id: None, before: None, after: Some(&fields) })
            .await?;
        self.inner.add(collection, fields).await
    }

    async fn query(&self, collection: &str, order_by: Option<&OrderBy>) -> Result<Vec<Document>, StoreError> {
        self.authorize(Request { op: Operation::List, collection, id: None, before: None, after: None })
            .await?;
        self.inner.query(collection, order_by).await
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.changes()
    }
}

#[cfg(test)]
#[path = "rules_test.rs"]
mod tests;
