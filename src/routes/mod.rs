//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Page routes return JSON view models after running the route guard; a
//! guarded page either renders, reports that the session is still loading,
//! or redirects. Actions live under `/api`. Live lists are Server-Sent
//! Event streams whose store subscription is disposed when the client
//! disconnects. Unknown paths redirect to `/`.

pub mod api;
pub mod auth;
pub mod pages;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::{get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{ErrorKind, Notice};
use crate::identity::IdentityError;
use crate::services::processes::ProcessError;
use crate::services::registration::RegistrationError;
use crate::services::users::RoleChangeError;
use crate::state::AppState;
use crate::store::StoreError;

// =============================================================================
// ERRORS
// =============================================================================

/// Blocking notice plus the status it is sent with.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub notice: Notice,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { status: kind.status(), notice: Notice::new(kind, message) }
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self { status: StatusCode::UNAUTHORIZED, notice: Notice::new(ErrorKind::PermissionDenied, "sign-in required") }
    }

    #[must_use]
    pub fn unverified() -> Self {
        Self { status: StatusCode::FORBIDDEN, notice: Notice::new(ErrorKind::PermissionDenied, "email not verified") }
    }

    /// The session did not finish loading within the ready wait.
    #[must_use]
    pub fn loading() -> Self {
        Self { status: StatusCode::SERVICE_UNAVAILABLE, notice: Notice::new(ErrorKind::Network, "session is still loading") }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.notice)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<ProcessError> for ApiError {
    fn from(e: ProcessError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<RoleChangeError> for ApiError {
    fn from(e: RoleChangeError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

// =============================================================================
// ROUTER
// =============================================================================

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/login", get(auth::login_page))
        .route("/register", get(auth::register_page))
        .route("/verify-email", get(auth::verify_email_page))
        .route("/", get(pages::home))
        .route("/processes", get(pages::processes))
        .route("/processes/{id}", get(pages::process_detail))
        .route("/admin", get(pages::admin))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/verify-email/resend", post(auth::resend_verification))
        .route("/api/auth/verify-email/check", post(auth::check_verification))
        .route("/api/auth/password-reset", post(auth::password_reset))
        .route("/api/session", get(auth::session))
        .route("/api/session/events", get(auth::session_events))
        .route("/api/announcements/{surface}", get(api::get_announcement).put(api::save_announcement))
        .route("/api/announcements/{surface}/events", get(api::announcement_events))
        .route("/api/processes", post(api::create_process))
        .route("/api/processes/events", get(api::process_events))
        .route("/api/processes/{id}", patch(api::update_process).delete(api::delete_process))
        .route("/api/admin/users/events", get(api::user_events))
        .route("/api/admin/users/{uid}/role", patch(api::set_user_role))
        .route("/api/admin/audit", get(api::audit_log))
        .route("/healthz", get(healthz))
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn fallback() -> Redirect {
    Redirect::temporary("/")
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
