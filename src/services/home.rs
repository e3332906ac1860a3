//! Home dashboard: announcement, harbour-bar status and upcoming processes.
//!
//! The three sections load concurrently and independently; a failing
//! section carries an inline banner while the others still render.

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use super::announcements::{self, AnnouncementView, Surface};
use super::processes::{ProcessSummary, process_eta};
use crate::error::Banner;
use crate::role::Role;
use crate::store::collections::{BARRA, PROCESSES};
use crate::store::{Document, DocumentStore};

const BAR_STATUS_ID: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BarCondition {
    Open,
    Closed,
    Restricted,
    Unknown,
}

impl BarCondition {
    #[must_use]
    pub fn classify(status: &str) -> Self {
        match status.trim().to_uppercase().as_str() {
            "PRATICÁVEL" => Self::Open,
            "IMPRATICÁVEL" => Self::Closed,
            "PRATICÁVEL C/ RESTRIÇÕES" => Self::Restricted,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarStatus {
    pub status: String,
    pub condition: BarCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section<T> {
    pub data: T,
    pub error: Option<Banner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeView {
    pub announcement: AnnouncementView,
    pub bar: Section<Option<BarStatus>>,
    pub upcoming: Section<Vec<ProcessSummary>>,
}

/// Processes whose ETA falls within `[now, now + window_days]`, soonest
/// first. Processes without a parseable ETA are skipped.
#[must_use]
pub fn upcoming(docs: &[Document], now: OffsetDateTime, window_days: i64) -> Vec<ProcessSummary> {
    let limit = now + Duration::days(window_days);
    let mut soon: Vec<(OffsetDateTime, ProcessSummary)> = docs
        .iter()
        .filter_map(|doc| {
            let eta = process_eta(doc)?;
            (eta >= now && eta <= limit).then(|| (eta, ProcessSummary::from_document(doc)))
        })
        .collect();
    soon.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    soon.into_iter().map(|(_, summary)| summary).collect()
}

async fn load_bar(store: &dyn DocumentStore) -> Section<Option<BarStatus>> {
    match store.read_one(BARRA, BAR_STATUS_ID).await {
        Ok(doc) => {
            let data = doc.as_ref().and_then(|d| d.str_field("status")).map(|status| BarStatus {
                status: status.to_owned(),
                condition: BarCondition::classify(status),
            });
            Section { data, error: None }
        }
        Err(e) => {
            warn!(error = %e, "bar status load failed");
            Section { data: None, error: Some(Banner::could_not_load("the bar status", e.kind())) }
        }
    }
}

async fn load_upcoming(store: &dyn DocumentStore, now: OffsetDateTime, window_days: i64) -> Section<Vec<ProcessSummary>> {
    match store.query(PROCESSES, None).await {
        Ok(docs) => Section { data: upcoming(&docs, now, window_days), error: None },
        Err(e) => {
            warn!(error = %e, "upcoming processes load failed");
            Section { data: Vec::new(), error: Some(Banner::could_not_load("processes", e.kind())) }
        }
    }
}

pub async fn view(store: &dyn DocumentStore, role: Role, now: OffsetDateTime, window_days: i64) -> HomeView {
    let (announcement, bar, upcoming) = tokio::join!(
        announcements::view(store, Surface::Home, role),
        load_bar(store),
        load_upcoming(store, now, window_days),
    );
    HomeView { announcement, bar, upcoming }
}

#[cfg(test)]
#[path = "home_test.rs"]
mod tests;
