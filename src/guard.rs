//! Route guard: decides what a navigation renders.
//!
//! `decide` is a pure function of the session snapshot and the target page;
//! it is re-evaluated on every request.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Login,
    Register,
    VerifyEmail,
    Home,
    Processes,
    ProcessDetail,
    Admin,
}

impl Page {
    /// Pages reachable without a verified identity.
    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Self::Login | Self::Register | Self::VerifyEmail)
    }

    /// Canonical path for pages without parameters.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Register => "/register",
            Self::VerifyEmail => "/verify-email",
            Self::Home => "/",
            Self::Processes | Self::ProcessDetail => "/processes",
            Self::Admin => "/admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardState {
    pub loading: bool,
    pub signed_in: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Loading,
    RedirectLogin,
    RedirectVerifyEmail,
}

impl Decision {
    /// Redirect target, if the decision is a redirect.
    #[must_use]
    pub fn redirect_to(self) -> Option<&'static str> {
        match self {
            Self::RedirectLogin => Some(Page::Login.path()),
            Self::RedirectVerifyEmail => Some(Page::VerifyEmail.path()),
            Self::Allow | Self::Loading => None,
        }
    }
}

#[must_use]
pub fn decide(state: GuardState, target: Page) -> Decision {
    if state.loading {
        return Decision::Loading;
    }
    if target.is_public() {
        return Decision::Allow;
    }
    if !state.signed_in {
        return Decision::RedirectLogin;
    }
    if !state.verified {
        return Decision::RedirectVerifyEmail;
    }
    Decision::Allow
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
