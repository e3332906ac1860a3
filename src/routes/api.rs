//! JSON actions and live list streams for signed-in, verified users.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use super::ApiError;
use super::auth::{AuthUser, SSE_KEEP_ALIVE};
use crate::error::{Banner, ErrorKind};
use crate::role::{Capability, Role};
use crate::services::announcements::{self, AnnouncementView, Surface};
use crate::services::audit::{self, AuditEntry};
use crate::services::processes::{self, DetailView, ProcessUpdate};
use crate::services::users::{self, RoleChange};
use crate::session::SessionSnapshot;
use crate::state::AppState;
use crate::store::collections::{ANNOUNCEMENTS, PROCESSES, USERS};
use crate::store::watch::{subscribe_collection, subscribe_one};
use crate::store::{Document, DocumentStore, OrderBy, StoreError};
use crate::subscription::{Subscription, listener};

/// Pending events per live stream before snapshots are dropped.
const STREAM_BUFFER: usize = 16;

fn surface(raw: &str) -> Result<Surface, ApiError> {
    Surface::from_str(raw).ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("unknown announcement surface: {raw}")))
}

// =============================================================================
// ANNOUNCEMENTS
// =============================================================================

/// `GET /api/announcements/{surface}`
pub async fn get_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw): Path<String>,
) -> Result<Json<AnnouncementView>, ApiError> {
    let surface = surface(&raw)?;
    let store = auth.store(&state);
    Ok(Json(announcements::view(store.as_ref(), surface, auth.role()).await))
}

#[derive(Deserialize)]
pub struct AnnouncementBody {
    #[serde(default)]
    pub text: String,
}

/// `PUT /api/announcements/{surface}`: blank text clears the announcement.
pub async fn save_announcement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw): Path<String>,
    Json(body): Json<AnnouncementBody>,
) -> Result<Json<AnnouncementView>, ApiError> {
    let surface = surface(&raw)?;
    let store = auth.store(&state);
    if let Err(e) = announcements::save(store.as_ref(), surface, &body.text, &auth.uid, auth.role()).await {
        tracing::warn!(uid = %auth.uid, surface = surface.as_str(), error = %e, "announcement save failed");
        let notice = announcements::save_failed(&e);
        return Err(ApiError { status: notice.error.status(), notice });
    }
    Ok(Json(announcements::view(store.as_ref(), surface, auth.role()).await))
}

/// `GET /api/announcements/{surface}/events`: the surface on every change.
pub async fn announcement_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let surface = surface(&raw)?;
    let session = auth.session.store.watch();
    let uid = auth.uid.clone();
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let subscription = subscribe_one(
        auth.store(&state),
        ANNOUNCEMENTS,
        surface.as_str(),
        listener(move |snapshot: Result<Option<Document>, StoreError>| {
            let Some(role) = role_while_owned(&session, &uid) else {
                return;
            };
            let event = Event::default().event("announcement").json_data(announcements::render(surface, snapshot, role));
            if tx.try_send(event).is_err() {
                tracing::debug!(surface = surface.as_str(), "live stream full or closed; snapshot dropped");
            }
        }),
    );
    Ok(event_stream(rx, subscription))
}

// =============================================================================
// PROCESSES
// =============================================================================

#[derive(Serialize)]
pub struct Created {
    pub id: String,
    pub redirect: String,
}

/// `POST /api/processes`: create a process owned by the caller.
pub async fn create_process(State(state): State<AppState>, auth: AuthUser) -> Result<(StatusCode, Json<Created>), ApiError> {
    let store = auth.store(&state);
    let id = processes::create(store.as_ref(), &auth.uid, OffsetDateTime::now_utc()).await?;
    let redirect = format!("/processes/{id}");
    Ok((StatusCode::CREATED, Json(Created { id, redirect })))
}

/// `PATCH /api/processes/{id}`: edit title and/or status.
pub async fn update_process(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ProcessUpdate>,
) -> Result<Json<DetailView>, ApiError> {
    let store = auth.store(&state);
    processes::update(store.as_ref(), &id, &auth.uid, &body).await?;
    Ok(Json(processes::detail(store.as_ref(), &id, &auth.uid, auth.role()).await?))
}

/// `DELETE /api/processes/{id}`
pub async fn delete_process(State(state): State<AppState>, auth: AuthUser, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let store = auth.store(&state);
    processes::delete(store.as_ref(), &id, &auth.uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/processes/events`: the process list on every change.
pub async fn process_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    live_collection(
        auth.store(&state),
        auth.session.store.watch(),
        auth.uid,
        PROCESSES,
        processes::list_order(),
        processes::list_view,
    )
}

// =============================================================================
// ADMIN
// =============================================================================

/// `GET /api/admin/users/events`: the user list on every change.
pub async fn user_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    if !auth.role().can(Capability::ViewAdminPanel) {
        return Err(ApiError::new(ErrorKind::PermissionDenied, "admin panel requires the admin or comex role"));
    }
    Ok(live_collection(
        auth.store(&state),
        auth.session.store.watch(),
        auth.uid,
        USERS,
        users::list_order(),
        users::admin_view,
    ))
}

/// Entries returned by the audit log endpoint.
const AUDIT_PAGE: usize = 100;

/// `GET /api/admin/audit`: newest audit entries (admins only).
pub async fn audit_log(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let store = auth.store(&state);
    Ok(Json(audit::recent(store.as_ref(), AUDIT_PAGE).await?))
}

#[derive(Serialize)]
pub struct RoleChanged {
    pub uid: String,
    pub role: Role,
}

/// `PATCH /api/admin/users/{uid}/role`
pub async fn set_user_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target): Path<String>,
    Json(body): Json<RoleChange>,
) -> Result<Json<RoleChanged>, ApiError> {
    let store = auth.store(&state);
    let role = users::set_role(store.as_ref(), &auth.uid, &target, &body.role).await?;
    Ok(Json(RoleChanged { uid: target, role }))
}

// =============================================================================
// LIVE STREAMS
// =============================================================================

/// Role of the session while it still belongs to `uid`; `None` once another
/// user (or nobody) is signed in.
fn role_while_owned(session: &watch::Receiver<SessionSnapshot>, uid: &str) -> Option<Role> {
    let snapshot = session.borrow();
    (snapshot.uid() == Some(uid)).then(|| snapshot.role())
}

/// SSE body over `rx`. The store subscription lives inside the stream and is
/// disposed when the client disconnects.
fn event_stream(
    rx: mpsc::Receiver<Result<Event, axum::Error>>,
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _subscription = &subscription;
        event
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

/// Stream a rendered collection snapshot per change. Snapshots stop once the
/// session no longer belongs to `uid`.
fn live_collection<V, F>(
    store: Arc<dyn DocumentStore>,
    session: watch::Receiver<SessionSnapshot>,
    uid: String,
    collection: &'static str,
    order_by: OrderBy,
    render: F,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    V: Serialize,
    F: Fn(&[Document], Role) -> V + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let subscription = subscribe_collection(
        store,
        collection,
        Some(order_by),
        listener(move |result: Result<Vec<Document>, StoreError>| {
            let Some(role) = role_while_owned(&session, &uid) else {
                return;
            };
            let event = match result {
                Ok(docs) => Event::default().event(collection).json_data(render(&docs, role)),
                Err(e) => Event::default().event("error").json_data(Banner::could_not_load(collection, e.kind())),
            };
            if tx.try_send(event).is_err() {
                tracing::debug!(collection, "live stream full or closed; snapshot dropped");
            }
        }),
    );
    event_stream(rx, subscription)
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
