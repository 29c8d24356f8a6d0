use axum::{extract::State, Json};

use crate::{
    error::{AppError, AppResult},
    models::DisplayStats,
    services::stats,
};

use super::AppState;

/// Handler for `GET /stats`
pub async fn display_stats(State(state): State<AppState>) -> AppResult<Json<DisplayStats>> {
    let snapshot = state.engine.snapshot().await?;
    let stats = tokio::task::spawn_blocking(move || stats::display_stats(&snapshot))
        .await
        .map_err(|e| AppError::Internal(format!("Stats task failed: {}", e)))?;
    Ok(Json(stats))
}
