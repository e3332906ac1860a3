//! Header and navigation for the current session.

use serde::Serialize;

use crate::guard::Page;
use crate::role::{Capability, Role};
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderView {
    pub signed_in: bool,
    pub loading: bool,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub nav: Vec<NavItem>,
}

/// Navigation entries visible to `role`. The admin entry needs
/// `ViewAdminPanel`.
#[must_use]
pub fn nav(role: Role) -> Vec<NavItem> {
    let mut items = vec![
        NavItem { label: "Home", path: Page::Home.path() },
        NavItem { label: "Processos", path: Page::Processes.path() },
    ];
    if role.can(Capability::ViewAdminPanel) {
        items.push(NavItem { label: "Admin", path: Page::Admin.path() });
    }
    items
}

#[must_use]
pub fn view(snapshot: &SessionSnapshot) -> HeaderView {
    let signed_in = snapshot.identity.is_some();
    let role = snapshot.role();
    HeaderView {
        signed_in,
        loading: snapshot.loading,
        name: snapshot.display_name(),
        email: snapshot.identity.as_ref().and_then(|i| i.email.clone()),
        role,
        verified: snapshot.guard_state().verified,
        nav: if signed_in { nav(role) } else { Vec::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::session::profile::Profile;

    fn snapshot(role: Role, name: &str) -> SessionSnapshot {
        let identity = Identity {
            uid: "u1".into(),
            email: Some("ana@sqquimica.com".into()),
            display_name: None,
            email_verified: true,
        };
        SessionSnapshot {
            profile: Some(Profile {
                uid: "u1".into(),
                email: identity.email.clone(),
                name: name.into(),
                role,
                email_verified: true,
            }),
            identity: Some(identity),
            loading: false,
        }
    }

    #[test]
    fn admin_entry_follows_capability() {
        let paths = |role| nav(role).into_iter().map(|i| i.path).collect::<Vec<_>>();
        assert_eq!(paths(Role::User), vec!["/", "/processes"]);
        assert_eq!(paths(Role::Comex), vec!["/", "/processes", "/admin"]);
        assert_eq!(paths(Role::Admin), vec!["/", "/processes", "/admin"]);
    }

    #[test]
    fn header_uses_email_when_name_is_blank() {
        let header = view(&snapshot(Role::User, ""));
        assert!(header.signed_in);
        assert!(header.verified);
        assert_eq!(header.name.as_deref(), Some("ana@sqquimica.com"));
    }

    #[test]
    fn signed_out_header_has_no_nav() {
        let mut snap = snapshot(Role::Admin, "Ana");
        snap.identity = None;
        snap.profile = None;
        let header = view(&snap);
        assert!(!header.signed_in);
        assert!(header.nav.is_empty());
        assert_eq!(header.role, Role::User);
    }
}
