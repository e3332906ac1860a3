//! Guarded pages: home, process list and detail, admin panel.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use serde::Serialize;
use time::OffsetDateTime;

use super::ApiError;
use super::auth::Visitor;
use crate::error::Banner;
use crate::guard::{self, Decision, Page};
use crate::role::Capability;
use crate::services::header::{self, HeaderView};
use crate::services::home::{self, Section};
use crate::services::processes::{self, ProcessError};
use crate::services::users;
use crate::state::AppState;
use crate::store::collections::USERS;

#[derive(Serialize)]
pub struct PageView<T> {
    pub page: Page,
    pub header: HeaderView,
    pub data: T,
}

fn render<T: Serialize>(page: Page, visitor: &Visitor, data: T) -> Response {
    Json(PageView { page, header: header::view(&visitor.snapshot), data }).into_response()
}

/// Run the route guard; `Err` carries the response to send instead.
fn guard_page(visitor: &Visitor, page: Page) -> Result<(), Response> {
    match guard::decide(visitor.snapshot.guard_state(), page) {
        Decision::Allow => Ok(()),
        Decision::Loading => Err((StatusCode::ACCEPTED, Json(serde_json::json!({ "loading": true }))).into_response()),
        decision => Err(Redirect::temporary(decision.redirect_to().unwrap_or(Page::Home.path())).into_response()),
    }
}

fn section<T, E: Into<ApiError>>(what: &str, result: Result<T, E>) -> Section<Option<T>> {
    match result {
        Ok(data) => Section { data: Some(data), error: None },
        Err(e) => {
            let e: ApiError = e.into();
            tracing::warn!(section = what, kind = e.notice.error.as_str(), error = %e.notice.message, "page section failed to load");
            Section { data: None, error: Some(Banner::could_not_load(what, e.notice.error)) }
        }
    }
}

/// `GET /`: announcements, bar status and upcoming processes.
pub async fn home(State(state): State<AppState>, visitor: Visitor) -> Response {
    if let Err(response) = guard_page(&visitor, Page::Home) {
        return response;
    }
    let store = visitor.store(&state);
    let view = home::view(
        store.as_ref(),
        visitor.snapshot.role(),
        OffsetDateTime::now_utc(),
        state.config.upcoming_window_days,
    )
    .await;
    render(Page::Home, &visitor, view)
}

/// `GET /processes`
pub async fn processes(State(state): State<AppState>, visitor: Visitor) -> Response {
    if let Err(response) = guard_page(&visitor, Page::Processes) {
        return response;
    }
    let store = visitor.store(&state);
    let list = processes::list(store.as_ref(), visitor.snapshot.role()).await;
    render(Page::Processes, &visitor, section("processes", list))
}

/// `GET /processes/{id}`: a missing process is a 404.
pub async fn process_detail(State(state): State<AppState>, visitor: Visitor, Path(id): Path<String>) -> Response {
    if let Err(response) = guard_page(&visitor, Page::ProcessDetail) {
        return response;
    }
    let store = visitor.store(&state);
    let uid = visitor.snapshot.uid().unwrap_or_default();
    match processes::detail(store.as_ref(), &id, uid, visitor.snapshot.role()).await {
        Err(e @ ProcessError::NotFound(_)) => ApiError::from(e).into_response(),
        result => render(Page::ProcessDetail, &visitor, section("process", result)),
    }
}

/// `GET /admin`: user list for roles with `ViewAdminPanel`; everyone else
/// goes home.
pub async fn admin(State(state): State<AppState>, visitor: Visitor) -> Response {
    if let Err(response) = guard_page(&visitor, Page::Admin) {
        return response;
    }
    let role = visitor.snapshot.role();
    if !role.can(Capability::ViewAdminPanel) {
        return Redirect::temporary(Page::Home.path()).into_response();
    }
    let store = visitor.store(&state);
    let view = store
        .query(USERS, Some(&users::list_order()))
        .await
        .map(|docs| users::admin_view(&docs, role));
    render(Page::Admin, &visitor, section("users", view))
}

#[cfg(test)]
#[path = "pages_test.rs"]
mod tests;
