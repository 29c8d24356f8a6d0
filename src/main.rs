use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use anime_recs::{
    config::Config,
    db::{self, Cache},
    routes::{create_router, AppState},
    services::{CachedRecommender, PgTableSource, RecommendationEngine, Recommender, TableSource},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anime_recs=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    let source: Arc<dyn TableSource> = Arc::new(PgTableSource::new(pool));
    let engine = Arc::new(RecommendationEngine::new(source, config.pipeline_settings()));

    let mut state = AppState::new(engine.clone());
    let mut cache_writer = None;

    if let (Some(redis_url), Some(ttl)) = (config.redis_url.as_deref(), config.cache_ttl()) {
        let client = db::create_redis_client(redis_url)?;
        let (cache, handle) = Cache::new(client).await;
        let cached: Arc<dyn Recommender> = Arc::new(CachedRecommender::new(engine, cache, ttl));
        state = state.with_recommender(cached);
        cache_writer = Some(handle);
        tracing::info!(ttl_secs = ttl, "Recommendation caching enabled");
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
