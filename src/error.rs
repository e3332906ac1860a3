//! Error taxonomy shared by the store, identity and view layers.
//!
//! Write failures surface as a blocking [`Notice`]; read and subscription
//! failures surface as an inline [`Banner`] and leave prior state untouched.

use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backing store's access rules rejected the operation.
    PermissionDenied,
    /// The referenced record is absent.
    NotFound,
    /// The call did not complete (transport, timeout, backend outage).
    Network,
    /// Input rejected before any call was made.
    Validation,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Network => "network",
            Self::Validation => "validation",
        }
    }

    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Network => StatusCode::BAD_GATEWAY,
            Self::Validation => StatusCode::BAD_REQUEST,
        }
    }
}

/// Blocking notification for a failed user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub error: ErrorKind,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self { error, message: message.into() }
    }
}

/// Inline "could not load" marker attached to a view section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub error: ErrorKind,
    pub message: String,
}

impl Banner {
    #[must_use]
    pub fn could_not_load(what: &str, error: ErrorKind) -> Self {
        let hint = match error {
            ErrorKind::PermissionDenied => " Check your permissions or contact an administrator.",
            ErrorKind::Network => " Try again in a moment.",
            ErrorKind::NotFound | ErrorKind::Validation => "",
        };
        Self { error, message: format!("Could not load {what}.{hint}") }
    }
}
