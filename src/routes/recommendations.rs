use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::RecommendationSet,
};

use super::AppState;

/// Largest list length a caller may ask for
pub const MAX_COUNT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub count: Option<usize>,
}

/// Handler for `GET /users/:user_id/recommendations`
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<i32>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationSet>> {
    let count = query.count.unwrap_or(state.default_count);
    if count > MAX_COUNT {
        return Err(AppError::InvalidInput(format!(
            "count must be at most {}, got {}",
            MAX_COUNT, count
        )));
    }

    tracing::info!(%request_id, user_id, count, "Recommendations requested");

    let set = state.recommender.recommend(user_id, count).await?;
    Ok(Json(set))
}
