//! ROM library management server.
//!
//! Watches a partitioned library root (`<root>/<system>/<file>`),
//! reconciles the on-disk files against a SQLite catalog, enriches
//! entries from a remote lookup service, and serves the catalog plus
//! on-demand merged archives over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod types;

use crate::config::PlatformTable;
use crate::scheduler::SyncScheduler;
use crate::services::composer::ArchiveComposer;
use crate::services::scanner::RomScanner;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub root: PathBuf,
    pub platforms: Arc<PlatformTable>,
    pub scanner: Arc<RomScanner>,
    pub scheduler: SyncScheduler,
    pub composer: Arc<ArchiveComposer>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/sync", post(api::sync::start_sync))
        .route("/sync/refresh", post(api::sync::refresh_entry))
        .route("/sync/stop", post(api::sync::stop_sync))
        .route("/sync/status", get(api::sync::sync_status))
        .route("/systems", get(api::library::list_systems))
        .route("/entries/:system", get(api::library::list_entries))
        .route(
            "/roms/:system/:filename/download",
            get(api::library::download_rom),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
