use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    // A trivial query doubles as a database liveness probe
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| crate::error::ApiError::Internal(format!("Database unavailable: {}", e)))?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
