//! Auth routes: sign-in, registration, email verification, session feed.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

use super::ApiError;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::guard::Page;
use crate::identity::Persistence;
use crate::role::Role;
use crate::services::header::{self, HeaderView};
use crate::services::registration::{self, Registration, RegistrationOutcome};
use crate::session::SessionSnapshot;
use crate::session::registry::ClientSession;
use crate::state::AppState;
use crate::store::DocumentStore;

pub const COOKIE_NAME: &str = "comex_session";

pub(crate) const SSE_KEEP_ALIVE: std::time::Duration = std::time::Duration::from_secs(15);

fn session_cookie(config: &Config, token: &str, persistence: Persistence) -> Cookie<'static> {
    let cookie = Cookie::build((COOKIE_NAME, token.to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure);
    match persistence {
        Persistence::Durable => cookie.max_age(config.durable_session).build(),
        Persistence::TabScoped => cookie.build(),
    }
}

fn cleared_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(time::Duration::ZERO)
        .build()
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Client session named by the request cookie, if it is still registered.
pub struct OptionalSession(pub Option<Arc<ClientSession>>);

impl<S> FromRequestParts<S> for OptionalSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Ok(Self(None));
        }
        let app_state = AppState::from_ref(state);
        Ok(Self(app_state.sessions.get(token).await))
    }
}

/// Any visitor, with the settled session snapshot (signed out when there is
/// no session). Used by pages, which run the route guard themselves.
pub struct Visitor {
    pub session: Option<Arc<ClientSession>>,
    pub snapshot: SessionSnapshot,
}

impl Visitor {
    /// Store acting as this visitor.
    #[must_use]
    pub fn store(&self, state: &AppState) -> Arc<dyn DocumentStore> {
        state.access.as_user(self.snapshot.uid())
    }
}

impl<S> FromRequestParts<S> for Visitor
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalSession(session) = OptionalSession::from_request_parts(parts, state).await?;
        let app_state = AppState::from_ref(state);
        let snapshot = match &session {
            Some(session) => session.store.wait_ready(app_state.config.session_ready_wait).await,
            None => SessionSnapshot::signed_out(),
        };
        Ok(Self { session, snapshot })
    }
}

/// Signed-in user, verified or not.
pub struct SignedInUser {
    pub session: Arc<ClientSession>,
    pub snapshot: SessionSnapshot,
    pub uid: String,
}

impl<S> FromRequestParts<S> for SignedInUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Visitor { session, snapshot }) = Visitor::from_request_parts(parts, state).await;
        let session = session.ok_or_else(ApiError::unauthorized)?;
        if snapshot.loading {
            return Err(ApiError::loading());
        }
        let uid = snapshot.uid().ok_or_else(ApiError::unauthorized)?.to_owned();
        Ok(Self { session, snapshot, uid })
    }
}

/// Signed-in user with a verified email.
/// Use as a handler parameter to require full access.
pub struct AuthUser {
    pub session: Arc<ClientSession>,
    pub snapshot: SessionSnapshot,
    pub uid: String,
}

impl AuthUser {
    #[must_use]
    pub fn role(&self) -> Role {
        self.snapshot.role()
    }

    /// Store acting as this user; the store rules see their current role.
    #[must_use]
    pub fn store(&self, state: &AppState) -> Arc<dyn DocumentStore> {
        state.access.as_user(Some(&self.uid))
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SignedInUser { session, snapshot, uid } = SignedInUser::from_request_parts(parts, state).await?;
        if !snapshot.guard_state().verified {
            return Err(ApiError::unverified());
        }
        Ok(Self { session, snapshot, uid })
    }
}

// =============================================================================
// PAGES
// =============================================================================

#[derive(Serialize)]
pub struct AuthPage {
    pub page: Page,
    pub header: HeaderView,
    pub corporate_domain: String,
}

fn auth_page(state: &AppState, page: Page, snapshot: &SessionSnapshot) -> Json<AuthPage> {
    Json(AuthPage {
        page,
        header: header::view(snapshot),
        corporate_domain: state.access.rules().corporate_domain().to_owned(),
    })
}

/// `GET /login`: sign-in page; verified sessions go straight home.
pub async fn login_page(State(state): State<AppState>, visitor: Visitor) -> Response {
    let guard = visitor.snapshot.guard_state();
    if guard.signed_in && guard.verified {
        return Redirect::temporary(Page::Home.path()).into_response();
    }
    auth_page(&state, Page::Login, &visitor.snapshot).into_response()
}

/// `GET /register`: registration page.
pub async fn register_page(State(state): State<AppState>, visitor: Visitor) -> Json<AuthPage> {
    auth_page(&state, Page::Register, &visitor.snapshot)
}

/// `GET /verify-email`: "check your email" page.
pub async fn verify_email_page(State(state): State<AppState>, visitor: Visitor) -> Json<AuthPage> {
    auth_page(&state, Page::VerifyEmail, &visitor.snapshot)
}

// =============================================================================
// ACTIONS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub redirect: &'static str,
    pub header: HeaderView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationOutcome>,
}

async fn session_for(state: &AppState, existing: Option<Arc<ClientSession>>) -> (Arc<ClientSession>, bool) {
    match existing {
        Some(session) => (session, false),
        None => (state.sessions.create(state.identity.as_ref(), state.profiles()).await, true),
    }
}

fn landing(verified: bool) -> &'static str {
    if verified { Page::Home.path() } else { Page::VerifyEmail.path() }
}

/// `POST /api/auth/login`: sign in and bind the client session cookie.
pub async fn login(
    State(state): State<AppState>,
    OptionalSession(existing): OptionalSession,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::new(ErrorKind::Validation, "email and password are required"));
    }

    let (session, created) = session_for(&state, existing).await;
    let persistence = Persistence::from_remember(body.remember);
    let identity = match session.store.provider().sign_in(body.email.trim(), &body.password, persistence).await {
        Ok(identity) => identity,
        Err(e) => {
            if created {
                state.sessions.remove(&session.token).await;
            }
            return Err(e.into());
        }
    };

    let snapshot = session.store.wait_settled(Some(identity.uid.as_str()), state.config.session_ready_wait).await;
    let verified = if snapshot.uid() == Some(identity.uid.as_str()) {
        snapshot.guard_state().verified
    } else {
        identity.email_verified
    };
    info!(uid = %identity.uid, ?persistence, verified, "signed in");

    let jar = jar.add(session_cookie(&state.config, &session.token, persistence));
    let body = AuthResponse { redirect: landing(verified), header: header::view(&snapshot), registration: None };
    Ok((jar, Json(body)).into_response())
}

/// `POST /api/auth/register`: create the account, profile and verification
/// email, leaving the new user signed in on the verify-email page.
pub async fn register(
    State(state): State<AppState>,
    OptionalSession(existing): OptionalSession,
    jar: CookieJar,
    Json(form): Json<Registration>,
) -> Result<Response, ApiError> {
    let domain = state.access.rules().corporate_domain().to_owned();
    registration::validate(&form, &domain)?;

    let (session, created) = session_for(&state, existing).await;
    let access = state.access.clone();
    let outcome = match registration::register(
        session.store.provider().as_ref(),
        move |uid| access.as_user(Some(uid)),
        &form,
        &domain,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            if created {
                state.sessions.remove(&session.token).await;
            }
            return Err(e.into());
        }
    };

    let snapshot = session.store.wait_settled(Some(outcome.uid.as_str()), state.config.session_ready_wait).await;
    let jar = jar.add(session_cookie(&state.config, &session.token, Persistence::TabScoped));
    let body = AuthResponse {
        redirect: Page::VerifyEmail.path(),
        header: header::view(&snapshot),
        registration: Some(outcome),
    };
    Ok((StatusCode::CREATED, jar, Json(body)).into_response())
}

/// `POST /api/auth/logout`: sign out, drop the client session, clear cookie.
pub async fn logout(State(state): State<AppState>, OptionalSession(session): OptionalSession) -> impl IntoResponse {
    if let Some(session) = session {
        if let Err(e) = session.store.provider().sign_out().await {
            warn!(error = %e, "provider sign-out failed");
        }
        session.store.wait_settled(None, state.config.session_ready_wait).await;
        state.sessions.remove(&session.token).await;
    }
    let jar = CookieJar::new().add(cleared_cookie(&state.config));
    (jar, StatusCode::NO_CONTENT)
}

/// `POST /api/auth/verify-email/resend`: send the verification email again.
pub async fn resend_verification(user: SignedInUser) -> Result<StatusCode, ApiError> {
    let identity = user.snapshot.identity.as_ref().ok_or_else(ApiError::unauthorized)?;
    user.session.store.provider().send_verification_email(identity).await?;
    info!(uid = %user.uid, "verification email resent");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct VerificationCheck {
    pub verified: bool,
    pub redirect: Option<&'static str>,
}

/// `POST /api/auth/verify-email/check`: refresh the identity and, once
/// verified, send the user home.
pub async fn check_verification(user: SignedInUser) -> Json<VerificationCheck> {
    let snapshot = user.session.store.refresh_user().await;
    let verified = snapshot.uid() == Some(user.uid.as_str()) && snapshot.guard_state().verified;
    Json(VerificationCheck { verified, redirect: verified.then(|| Page::Home.path()) })
}

#[derive(Deserialize)]
pub struct PasswordResetBody {
    pub email: String,
}

/// `POST /api/auth/password-reset`: send the provider's reset email.
pub async fn password_reset(
    State(state): State<AppState>,
    OptionalSession(session): OptionalSession,
    Json(body): Json<PasswordResetBody>,
) -> Result<StatusCode, ApiError> {
    let email = body.email.trim();
    if email.is_empty() {
        return Err(ApiError::new(ErrorKind::Validation, "email is required"));
    }
    let provider = match &session {
        Some(session) => session.store.provider().clone(),
        None => state.identity.connect(),
    };
    provider.send_password_reset(email).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// SESSION FEED
// =============================================================================

/// `GET /api/session`: header view of the current session.
pub async fn session(visitor: Visitor) -> Json<HeaderView> {
    Json(header::view(&visitor.snapshot))
}

/// `GET /api/session/events`: header view on every session change.
pub async fn session_events(
    OptionalSession(session): OptionalSession,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let session = session.ok_or_else(ApiError::unauthorized)?;
    let stream = WatchStream::new(session.store.watch()).map(move |snapshot| {
        let _session = &session;
        Event::default().event("session").json_data(header::view(&snapshot))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
