//! Sync control endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::scheduler::{EnqueueOutcome, SyncRequest, SyncStatusView};
use crate::types::SyncOptions;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSyncRequest {
    pub system: String,
    #[serde(default)]
    pub options: Option<SyncOptions>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub system: String,
    pub filename: String,
}

fn outcome_response(outcome: EnqueueOutcome) -> Json<Value> {
    let status = match outcome {
        EnqueueOutcome::Accepted => "accepted",
        EnqueueOutcome::Ignored => "ignored",
    };
    Json(json!({ "status": status }))
}

/// POST /sync
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<StartSyncRequest>,
) -> ApiResult<Json<Value>> {
    if !state.root.join(&request.system).is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Unknown system: {}",
            request.system
        )));
    }

    let outcome = state.scheduler.enqueue(SyncRequest {
        system: request.system,
        options: request.options.unwrap_or_default(),
        only: None,
    });

    Ok(outcome_response(outcome))
}

/// POST /sync/refresh
///
/// Single-item forced refresh: all categories on, cache ignored,
/// existing assets overwritten.
pub async fn refresh_entry(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<Value>> {
    let path = state.root.join(&request.system).join(&request.filename);
    if !path.is_file() {
        return Err(ApiError::NotFound(format!(
            "No such file: {}/{}",
            request.system, request.filename
        )));
    }

    let outcome = state.scheduler.enqueue(SyncRequest {
        system: request.system,
        options: SyncOptions::forced_refresh(),
        only: Some(request.filename),
    });

    Ok(outcome_response(outcome))
}

/// POST /sync/stop
pub async fn stop_sync(State(state): State<AppState>) -> Json<Value> {
    state.scheduler.stop();
    Json(json!({ "status": "stopping" }))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusView> {
    Json(state.scheduler.status())
}
