//! Best-effort audit trail for process changes.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::store::collections::AUDIT_LOGS;
use crate::store::{Document, DocumentStore, Fields, OrderBy, StoreError, server_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Update,
    Delete,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Append an audit entry. Failures are logged and otherwise ignored.
pub async fn record(store: &dyn DocumentStore, entity: &str, action: Action, user_id: &str, diff: Option<Value>) {
    let mut entry = Fields::new();
    entry.insert("entity".into(), Value::String(entity.to_owned()));
    entry.insert("action".into(), Value::String(action.as_str().to_owned()));
    entry.insert("userId".into(), Value::String(user_id.to_owned()));
    entry.insert("diff".into(), diff.unwrap_or(Value::Null));
    entry.insert("createdAt".into(), server_timestamp());

    if let Err(e) = store.add(AUDIT_LOGS, entry).await {
        warn!(%entity, action = action.as_str(), error = %e, "audit log write failed");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub entity: String,
    pub action: String,
    pub user_id: String,
    pub diff: Value,
    pub created_at: Option<String>,
}

impl AuditEntry {
    fn from_document(doc: &Document) -> Self {
        let text = |key| doc.str_field(key).unwrap_or_default().to_owned();
        Self {
            id: doc.id.clone(),
            entity: text("entity"),
            action: text("action"),
            user_id: text("userId"),
            diff: doc.fields.get("diff").cloned().unwrap_or(Value::Null),
            created_at: doc.str_field("createdAt").map(str::to_owned),
        }
    }
}

/// Newest `limit` entries first. Reading the log needs `ReadAuditLog`,
/// which the store rules enforce.
///
/// # Errors
///
/// Returns the store error (permission-denied below admin).
pub async fn recent(store: &dyn DocumentStore, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
    let mut docs = store.query(AUDIT_LOGS, Some(&OrderBy::desc("createdAt"))).await?;
    docs.truncate(limit);
    Ok(docs.iter().map(AuditEntry::from_document).collect())
}

#[cfg(test)]
#[path = "audit_test.rs"]
mod tests;
