use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::middleware::{make_span_with_request_id, request_id_middleware};
use crate::services::{RecommendationEngine, Recommender};

pub mod recommendations;
pub mod stats;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Answers recommendation requests; may sit behind a cache
    pub recommender: Arc<dyn Recommender>,
    /// Uncached engine, used for snapshots such as display stats
    pub engine: Arc<RecommendationEngine>,
    pub default_count: usize,
}

impl AppState {
    /// State that talks to the engine directly
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        let default_count = engine.settings().default_count;
        Self {
            recommender: engine.clone(),
            engine,
            default_count,
        }
    }

    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = recommender;
        self
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum::middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/recommendations",
            get(recommendations::recommend),
        )
        .route("/stats", get(stats::display_stats))
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
