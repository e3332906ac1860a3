//! Authorization tiers and the capabilities each one unlocks.
//!
//! Views use [`Role::can`] to decide which affordances to render. This is
//! authorization by hiding; enforcement happens in `store::rules`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Comex,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateProcess,
    EditAnyProcess,
    DeleteProcess,
    EditAnnouncements,
    ViewAdminPanel,
    ListUsers,
    ManageRoles,
    ReadAuditLog,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Comex => "comex",
            Self::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "comex" => Some(Self::Comex),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn can(self, capability: Capability) -> bool {
        use Capability::*;
        match (self, capability) {
            (Self::Admin, _) => true,
            (
                Self::Comex,
                CreateProcess | EditAnyProcess | DeleteProcess | EditAnnouncements | ViewAdminPanel | ListUsers,
            ) => true,
            (Self::Comex, ManageRoles | ReadAuditLog) => false,
            (
                Self::User,
                CreateProcess
                | EditAnyProcess
                | DeleteProcess
                | EditAnnouncements
                | ViewAdminPanel
                | ListUsers
                | ManageRoles
                | ReadAuditLog,
            ) => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "role_test.rs"]
mod tests;
