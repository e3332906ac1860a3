//! Process list and detail views.
//!
//! DESIGN
//! ======
//! The list is ordered by `eta_original` ascending and re-delivered in full
//! on every change. Creation stamps a `P-<millis>` title, status `novo` and
//! makes the creator the sole owner. Title/status edits are open to owners
//! and privileged roles, deletion to privileged roles only; both append a
//! best-effort audit entry.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use super::audit::{self, Action};
use crate::error::ErrorKind;
use crate::role::{Capability, Role};
use crate::store::collections::PROCESSES;
use crate::store::{Document, DocumentStore, Fields, OrderBy, StoreError, server_timestamp};

pub const DEFAULT_STATUS: &str = "novo";
const SHORT_ID_LEN: usize = 6;
const MAX_TITLE_LEN: usize = 200;
const MAX_STATUS_LEN: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("invalid process update: {0}")]
    Validation(String),
    #[error("process not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
        }
    }
}

// =============================================================================
// ETA
// =============================================================================

/// Parse an ETA value: RFC 3339 or `YYYY-MM-DD` strings, epoch
/// milliseconds, or a `{seconds, nanoseconds}` timestamp object.
#[must_use]
pub fn parse_eta(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
                time::Date::parse(raw, format_description!("[year]-[month]-[day]"))
                    .ok()
                    .map(|d| d.midnight().assume_utc())
            })
        }
        Value::Number(n) => {
            #[allow(clippy::cast_possible_truncation)]
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        }
        Value::Object(o) => {
            let seconds = o.get("seconds").and_then(Value::as_i64)?;
            OffsetDateTime::from_unix_timestamp(seconds).ok()
        }
        _ => None,
    }
}

/// ETA of a process, honouring the legacy field names.
#[must_use]
pub fn process_eta(doc: &Document) -> Option<OffsetDateTime> {
    ["eta", "eta_original", "etaDate"]
        .iter()
        .find_map(|key| doc.fields.get(*key).filter(|v| !v.is_null()))
        .and_then(parse_eta)
}

fn format_eta(eta: OffsetDateTime) -> Option<String> {
    eta.format(&Rfc3339).ok()
}

// =============================================================================
// VIEWS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub id: String,
    pub short_id: String,
    pub title: String,
    pub status: String,
    pub eta: Option<String>,
    pub owners: Vec<String>,
}

impl ProcessSummary {
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let title = ["processo", "description", "po"]
            .iter()
            .find_map(|key| doc.str_field(key))
            .unwrap_or("Processo")
            .to_owned();
        let owners = doc
            .fields
            .get("owners")
            .and_then(Value::as_array)
            .map(|owners| owners.iter().filter_map(Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default();
        Self {
            id: doc.id.clone(),
            short_id: doc.id.chars().take(SHORT_ID_LEN).collect(),
            title,
            status: doc.str_field("status").unwrap_or(DEFAULT_STATUS).to_owned(),
            eta: process_eta(doc).and_then(format_eta),
            owners,
        }
    }

    #[must_use]
    pub fn is_owner(&self, uid: &str) -> bool {
        self.owners.iter().any(|o| o == uid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    pub processes: Vec<ProcessSummary>,
    pub can_create: bool,
}

#[must_use]
pub fn list_order() -> OrderBy {
    OrderBy::asc("eta_original")
}

#[must_use]
pub fn list_view(docs: &[Document], role: Role) -> ListView {
    ListView {
        processes: docs.iter().map(ProcessSummary::from_document).collect(),
        can_create: role.can(Capability::CreateProcess),
    }
}

/// # Errors
///
/// Returns the store error if the query fails.
pub async fn list(store: &dyn DocumentStore, role: Role) -> Result<ListView, StoreError> {
    let docs = store.query(PROCESSES, Some(&list_order())).await?;
    Ok(list_view(&docs, role))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailView {
    #[serde(flatten)]
    pub process: ProcessSummary,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// # Errors
///
/// Returns `NotFound` for a missing process, or the store error.
pub async fn detail(store: &dyn DocumentStore, id: &str, uid: &str, role: Role) -> Result<DetailView, ProcessError> {
    let doc = store
        .read_one(PROCESSES, id)
        .await?
        .ok_or_else(|| ProcessError::NotFound(id.to_owned()))?;
    let process = ProcessSummary::from_document(&doc);
    Ok(DetailView {
        can_edit: process.is_owner(uid) || role.can(Capability::EditAnyProcess),
        can_delete: role.can(Capability::DeleteProcess),
        process,
    })
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Create a new process owned by `uid` and return its id.
///
/// # Errors
///
/// Returns the store error (permission-denied for non-privileged roles).
pub async fn create(store: &dyn DocumentStore, uid: &str, now: OffsetDateTime) -> Result<String, StoreError> {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let mut fields = Fields::new();
    fields.insert("processo".into(), Value::String(format!("P-{millis}")));
    fields.insert("status".into(), Value::String(DEFAULT_STATUS.to_owned()));
    fields.insert("owners".into(), json!([uid]));
    fields.insert("createdAt".into(), server_timestamp());
    fields.insert("createdBy".into(), Value::String(uid.to_owned()));
    let id = store.add(PROCESSES, fields).await?;
    tracing::info!(%id, %uid, "process created");
    Ok(id)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessUpdate {
    pub title: Option<String>,
    pub status: Option<String>,
}

fn checked(value: Option<&str>, field: &str, max: usize) -> Result<Option<String>, ProcessError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(None);
    };
    if value.is_empty() {
        return Err(ProcessError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(ProcessError::Validation(format!("{field} is longer than {max} characters")));
    }
    Ok(Some(value.to_owned()))
}

/// Apply a title/status edit.
///
/// # Errors
///
/// Returns `Validation` for empty/oversized fields or an empty update,
/// `NotFound` for a missing process, or the store error.
pub async fn update(store: &dyn DocumentStore, id: &str, uid: &str, update: &ProcessUpdate) -> Result<(), ProcessError> {
    let title = checked(update.title.as_deref(), "title", MAX_TITLE_LEN)?;
    let status = checked(update.status.as_deref(), "status", MAX_STATUS_LEN)?;
    if title.is_none() && status.is_none() {
        return Err(ProcessError::Validation("nothing to update".into()));
    }
    if store.read_one(PROCESSES, id).await?.is_none() {
        return Err(ProcessError::NotFound(id.to_owned()));
    }

    let mut diff = Fields::new();
    if let Some(title) = title {
        diff.insert("processo".into(), Value::String(title));
    }
    if let Some(status) = status {
        diff.insert("status".into(), Value::String(status));
    }
    let mut fields = diff.clone();
    fields.insert("updatedAt".into(), server_timestamp());
    store.write_one(PROCESSES, id, fields, true).await?;

    audit::record(store, &format!("{PROCESSES}/{id}"), Action::Update, uid, Some(Value::Object(diff))).await;
    Ok(())
}

/// # Errors
///
/// Returns `NotFound` for a missing process, or the store error.
pub async fn delete(store: &dyn DocumentStore, id: &str, uid: &str) -> Result<(), ProcessError> {
    if store.read_one(PROCESSES, id).await?.is_none() {
        return Err(ProcessError::NotFound(id.to_owned()));
    }
    store.delete_one(PROCESSES, id).await?;
    tracing::info!(%id, %uid, "process deleted");
    audit::record(store, &format!("{PROCESSES}/{id}"), Action::Delete, uid, None).await;
    Ok(())
}

#[cfg(test)]
#[path = "processes_test.rs"]
mod tests;
