//! Announcement singletons, one per surface.
//!
//! Saving is a merge write of `{text, updatedAt, updatedBy}`; concurrent
//! editors are last-writer-wins.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Banner, ErrorKind, Notice};
use crate::role::{Capability, Role};
use crate::store::collections::ANNOUNCEMENTS;
use crate::store::{Document, DocumentStore, Fields, StoreError, server_timestamp};

const DENIED_MESSAGE: &str = "You do not have permission to edit announcements. Only admin or comex users can edit them.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Dashboard card.
    Home,
    /// Site-wide notice. Clients fetch or stream it on their own; it is not
    /// part of the header view.
    Global,
}

impl Surface {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Global => "global",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "home" => Some(Self::Home),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub text: Option<String>,
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

impl Announcement {
    fn from_document(doc: &Document) -> Self {
        Self {
            text: doc.str_field("text").map(str::to_owned),
            updated_at: doc.str_field("updatedAt").map(str::to_owned),
            updated_by: doc.str_field("updatedBy").map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnouncementView {
    pub surface: Surface,
    #[serde(flatten)]
    pub announcement: Announcement,
    pub can_edit: bool,
    pub error: Option<Banner>,
}

/// View model for a surface; read failures become an inline banner and a
/// missing record is an empty announcement.
pub async fn view(store: &dyn DocumentStore, surface: Surface, role: Role) -> AnnouncementView {
    render(surface, store.read_one(ANNOUNCEMENTS, surface.as_str()).await, role)
}

/// View model from one read (or live snapshot) of the surface's record.
#[must_use]
pub fn render(surface: Surface, snapshot: Result<Option<Document>, StoreError>, role: Role) -> AnnouncementView {
    let (announcement, error) = match snapshot {
        Ok(doc) => (doc.as_ref().map(Announcement::from_document).unwrap_or_default(), None),
        Err(e) => {
            tracing::warn!(surface = surface.as_str(), error = %e, "announcement load failed");
            (Announcement::default(), Some(Banner::could_not_load("announcements", e.kind())))
        }
    };
    AnnouncementView { surface, announcement, can_edit: role.can(Capability::EditAnnouncements), error }
}

/// Save the text of a surface. Blank text clears the announcement.
///
/// # Errors
///
/// Returns `PermissionDenied` without writing when `role` cannot edit, or
/// the store error if the write fails.
pub async fn save(store: &dyn DocumentStore, surface: Surface, text: &str, uid: &str, role: Role) -> Result<(), StoreError> {
    if !role.can(Capability::EditAnnouncements) {
        return Err(StoreError::PermissionDenied(format!("{role} cannot edit announcements")));
    }
    let text = text.trim();
    let mut fields = Fields::new();
    fields.insert("text".into(), if text.is_empty() { Value::Null } else { Value::String(text.to_owned()) });
    fields.insert("updatedAt".into(), server_timestamp());
    fields.insert("updatedBy".into(), Value::String(uid.to_owned()));
    store.write_one(ANNOUNCEMENTS, surface.as_str(), fields, true).await
}

/// Blocking notice for a failed save.
#[must_use]
pub fn save_failed(err: &StoreError) -> Notice {
    match err.kind() {
        ErrorKind::PermissionDenied => Notice::new(ErrorKind::PermissionDenied, DENIED_MESSAGE),
        kind => Notice::new(kind, format!("Could not save announcement: {err}")),
    }
}

#[cfg(test)]
#[path = "announcements_test.rs"]
mod tests;
