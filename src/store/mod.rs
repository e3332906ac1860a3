//! Document database boundary.
//!
//! ARCHITECTURE
//! ============
//! Documents are JSON objects addressed by `(collection, id)`. A store
//! exposes point reads/writes, whole-collection queries and a broadcast feed
//! of `Change` events; `watch` builds live document and collection
//! subscriptions on top of that feed, and `rules` enforces per-user access.
//!
//! Adapters: `postgres` (JSONB table + LISTEN/NOTIFY) and `memory`.
//!
//! Timestamps are server-assigned: writers put [`server_timestamp`] in a
//! field and the store replaces it with the write time.

pub mod memory;
pub mod postgres;
pub mod rules;
pub mod watch;

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::sync::broadcast;

use crate::error::ErrorKind;

pub type Fields = serde_json::Map<String, Value>;

/// Collection names used by the application.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROCESSES: &str = "processes";
    pub const ANNOUNCEMENTS: &str = "announcements";
    pub const BARRA: &str = "barra";
    pub const AUDIT_LOGS: &str = "audit_logs";
}

const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Sentinel replaced by the write time when the document is stored.
#[must_use]
pub fn server_timestamp() -> Value {
    let mut sentinel = Fields::new();
    sentinel.insert(SERVER_TIMESTAMP_KEY.to_owned(), Value::Bool(true));
    Value::Object(sentinel)
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
}

/// Replace every top-level server-timestamp sentinel with `now`.
pub(crate) fn resolve_server_timestamps(fields: &mut Fields, now: &str) {
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(now.to_owned());
        }
    }
}

/// Current time as RFC 3339 (UTC) with a fixed nine-digit fraction, so
/// stored timestamps also sort correctly as strings.
#[must_use]
pub fn now_rfc3339() -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");
    OffsetDateTime::now_utc().format(&format).unwrap_or_default()
}

fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self { id: id.into(), fields }
    }

    /// String field, treating empty strings as absent.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    #[must_use]
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_owned(), direction: Direction::Ascending }
    }

    #[must_use]
    pub fn desc(field: &str) -> Self {
        Self { field: field.to_owned(), direction: Direction::Descending }
    }
}

/// A document in `collection` was written or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl StoreError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Unavailable(_) | Self::Database(_) => ErrorKind::Network,
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_one(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, fields are merged into an existing
    /// document; otherwise the document is replaced.
    async fn write_one(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<(), StoreError>;

    /// Insert a document only if `id` is free. Returns `false`, writing
    /// nothing, when a document already exists.
    async fn create_one(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StoreError>;

    async fn delete_one(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Insert a document under a generated id and return the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Every document in `collection`, optionally ordered by a field.
    async fn query(&self, collection: &str, order_by: Option<&OrderBy>) -> Result<Vec<Document>, StoreError>;

    /// Feed of writes and deletes, used by live subscriptions.
    fn changes(&self) -> broadcast::Receiver<Change>;
}

// =============================================================================
// ORDERING
// =============================================================================

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, then by value. Two RFC 3339
/// strings compare as instants.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => tx.cmp(&ty),
            _ => x.cmp(y),
        },
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sort documents by `order_by`. Documents lacking the field go last in
/// either direction; ties keep id order.
pub fn sort_documents(docs: &mut [Document], order_by: Option<&OrderBy>) {
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    let Some(order) = order_by else {
        return;
    };
    docs.sort_by(|a, b| {
        let av = a.fields.get(&order.field).filter(|v| !v.is_null());
        let bv = b.fields.get(&order.field).filter(|v| !v.is_null());
        match (av, bv) {
            (Some(x), Some(y)) => match order.direction {
                Direction::Ascending => compare_values(x, y),
                Direction::Descending => compare_values(y, x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
