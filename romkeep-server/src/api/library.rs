//! Catalog browsing and ROM download endpoints.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::io::ReaderStream;

use crate::db::entries::{self, CatalogEntry};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemView {
    pub system: String,
    pub display_name: String,
    pub entry_count: i64,
    pub file_count: usize,
}

/// GET /systems
///
/// Partitions present on disk, with catalog entry counts and the
/// platform table's display names.
pub async fn list_systems(State(state): State<AppState>) -> ApiResult<Json<Vec<SystemView>>> {
    let on_disk = state.scanner.list_systems()?;
    let counts: HashMap<String, i64> = entries::list_systems_with_counts(&state.db)
        .await?
        .into_iter()
        .collect();

    let mut views = Vec::with_capacity(on_disk.len());
    for system in on_disk {
        let display_name = state
            .platforms
            .get(&system)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| system.clone());
        let file_count = state.scanner.list_roms(&system).map(|v| v.len()).unwrap_or(0);
        views.push(SystemView {
            entry_count: counts.get(&system).copied().unwrap_or(0),
            system,
            display_name,
            file_count,
        });
    }

    Ok(Json(views))
}

/// GET /entries/:system
pub async fn list_entries(
    State(state): State<AppState>,
    Path(system): Path<String>,
) -> ApiResult<Json<Vec<CatalogEntry>>> {
    let rows = entries::load_for_system(&state.db, &system).await?;
    Ok(Json(rows))
}

/// GET /roms/:system/:filename/download
///
/// Arcade-style systems get the composed archive (base + parent +
/// firmware); everything else streams the raw file.
pub async fn download_rom(
    State(state): State<AppState>,
    Path((system, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    // Path params must stay inside the partition
    if filename.contains('/') || filename.contains("..") || system.contains("..") {
        return Err(ApiError::BadRequest("Invalid path".to_string()));
    }

    let full_path = state.root.join(&system).join(&filename);
    if !full_path.is_file() {
        return Err(ApiError::NotFound(format!("{}/{}", system, filename)));
    }

    if state.platforms.uses_merged_archives(&system) {
        let path_key = entries::entry_path(&system, &filename);
        let entry = entries::load_by_path(&state.db, &path_key)
            .await?
            .unwrap_or_else(|| CatalogEntry::new(&system, &filename, &filename));

        let bytes = state.composer.compose(&entry).await?;
        return Ok(attachment_response(&filename, "application/zip", Body::from(bytes)));
    }

    let file = tokio::fs::File::open(&full_path).await?;
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(attachment_response(&filename, "application/octet-stream", body))
}

fn attachment_response(filename: &str, content_type: &str, body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}
