use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinError;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{PreprocessedData, RecommendationSet},
    services::{
        association, collaborative, content,
        loader::{load_tables, TableSource},
        preprocess::preprocess,
    },
};

/// Failures inside a single recommender
///
/// These never reach the caller: the engine logs them and substitutes an
/// empty list so the other recommenders still answer.
#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("{name} must be in (0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Tunables for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub min_support: f64,
    pub min_confidence: f64,
    /// Scores strictly above this count as liked
    pub like_threshold: i32,
    pub default_count: usize,
    /// Bound on the whole load + preprocess + recommend run
    ///
    /// Expiry fails the request, but recommender work already handed to
    /// `spawn_blocking` cannot be cancelled. Those tasks run to completion
    /// in the background and their results are discarded.
    pub timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_support: 0.7,
            min_confidence: 0.7,
            like_threshold: 6,
            default_count: 5,
            timeout: None,
        }
    }
}

/// Produces recommendation sets for a user
#[async_trait::async_trait]
pub trait Recommender: Send + Sync {
    /// Up to `count` ids from each recommender
    async fn recommend(&self, user_id: i32, count: usize) -> AppResult<RecommendationSet>;
}

/// Load → preprocess → collaborative, association and content filters
///
/// Every call recomputes from the table source; nothing is kept between
/// calls.
pub struct RecommendationEngine {
    source: Arc<dyn TableSource>,
    settings: PipelineSettings,
}

impl RecommendationEngine {
    pub fn new(source: Arc<dyn TableSource>, settings: PipelineSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Loads and preprocesses a fresh snapshot of all tables
    pub async fn snapshot(&self) -> AppResult<PreprocessedData> {
        let tables = load_tables(self.source.as_ref()).await?;
        let data = tokio::task::spawn_blocking(move || preprocess(tables))
            .await
            .map_err(|e| AppError::Internal(format!("Preprocessing task failed: {}", e)))??;
        Ok(data)
    }

    async fn run(&self, user_id: i32, count: usize) -> AppResult<RecommendationSet> {
        let snapshot = Arc::new(self.snapshot().await?);
        Ok(run_recommenders(snapshot, user_id, count, &self.settings).await)
    }
}

#[async_trait::async_trait]
impl Recommender for RecommendationEngine {
    async fn recommend(&self, user_id: i32, count: usize) -> AppResult<RecommendationSet> {
        if count == 0 {
            return Ok(RecommendationSet::empty(user_id));
        }

        let start = Instant::now();
        let set = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(user_id, count))
                .await
                .map_err(|_| {
                    tracing::warn!(
                        user_id,
                        timeout_ms = limit.as_millis(),
                        "Recommendation pipeline timed out"
                    );
                    AppError::Timeout(format!(
                        "pipeline exceeded {} ms for user {}; retry later",
                        limit.as_millis(),
                        user_id
                    ))
                })??,
            None => self.run(user_id, count).await?,
        };

        tracing::info!(
            user_id,
            count,
            collaborative = set.collaborative.len(),
            association = set.association.len(),
            content = set.content.len(),
            processing_time_ms = start.elapsed().as_millis(),
            "Recommendations computed"
        );

        Ok(set)
    }
}

/// Runs the three recommenders in parallel against one snapshot
///
/// A recommender that errors or panics contributes an empty list.
pub async fn run_recommenders(
    snapshot: Arc<PreprocessedData>,
    user_id: i32,
    count: usize,
    settings: &PipelineSettings,
) -> RecommendationSet {
    let collaborative = {
        let data = Arc::clone(&snapshot);
        tokio::task::spawn_blocking(move || collaborative::recommend(&data.ratings, user_id, count))
    };

    let association = {
        let data = Arc::clone(&snapshot);
        let (min_support, min_confidence) = (settings.min_support, settings.min_confidence);
        tokio::task::spawn_blocking(move || {
            association::recommend(&data.users, user_id, count, min_support, min_confidence)
        })
    };

    let content = {
        let data = Arc::clone(&snapshot);
        let like_threshold = settings.like_threshold;
        tokio::task::spawn_blocking(move || {
            content::recommend(&data.ratings, &data.anime, user_id, count, like_threshold)
        })
    };

    let (collaborative, association, content) = tokio::join!(collaborative, association, content);

    RecommendationSet {
        user_id,
        collaborative: settle("collaborative", user_id, collaborative),
        association: settle("association", user_id, association),
        content: settle("content", user_id, content),
    }
}

fn settle(
    recommender: &'static str,
    user_id: i32,
    outcome: Result<Result<Vec<i32>, RecommenderError>, JoinError>,
) -> Vec<i32> {
    match outcome {
        Ok(Ok(ids)) => ids,
        Ok(Err(e)) => {
            tracing::error!(recommender, user_id, error = %e, "Recommender failed; returning no results");
            Vec::new()
        }
        Err(e) => {
            tracing::error!(recommender, user_id, error = %e, "Recommender task aborted; returning no results");
            Vec::new()
        }
    }
}

/// Serves recommendation sets from Redis when present, computing on a miss
///
/// Entries live for a fixed TTL and are not invalidated on new ratings, so
/// results may lag behind the data by up to `ttl` seconds.
pub struct CachedRecommender {
    inner: Arc<dyn Recommender>,
    cache: Cache,
    ttl: u64,
}

impl CachedRecommender {
    pub fn new(inner: Arc<dyn Recommender>, cache: Cache, ttl: u64) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait::async_trait]
impl Recommender for CachedRecommender {
    async fn recommend(&self, user_id: i32, count: usize) -> AppResult<RecommendationSet> {
        let key = CacheKey::Recommendations { user_id, count };
        cached!(self.cache, key, self.ttl, self.inner.recommend(user_id, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anime, Genre, IdList, Location, Rating, RawTables, Season, User};
    use crate::services::loader::InMemoryTableSource;

    fn rating(rating_id: i32, user_id: i32, anime_id: i32, score: i32) -> Rating {
        Rating {
            rating_id,
            user_id,
            anime_id,
            score,
            created_at: None,
            updated_at: None,
            review_text: None,
        }
    }

    fn anime(anime_id: i32, genre_ids: &[i32]) -> Anime {
        Anime {
            anime_id,
            name: format!("Anime {}", anime_id),
            genre_ids: IdList::Decoded(genre_ids.to_vec()),
            is_adult_rated: Some(false),
            is_running: Some(false),
            release_date: None,
            season_ids: IdList::default(),
            description: None,
            image_url: None,
            trailer_url: None,
            studio: None,
        }
    }

    fn user(user_id: i32, watched: &[i32]) -> User {
        User {
            user_id,
            username: format!("user{}", user_id),
            email: None,
            watched_anime: IdList::Decoded(watched.to_vec()),
            watching_anime: IdList::default(),
            anime_watched_count: None,
            anime_watching_count: None,
            location_id: None,
        }
    }

    fn tables() -> RawTables {
        RawTables {
            ratings: vec![
                rating(1, 1, 1, 9),
                rating(2, 2, 1, 8),
                rating(3, 2, 2, 9),
                rating(4, 3, 2, 7),
                rating(5, 3, 3, 8),
            ],
            anime: vec![anime(1, &[1]), anime(2, &[1, 2]), anime(3, &[2]), anime(4, &[1])],
            users: vec![
                user(1, &[1]),
                user(2, &[1, 2]),
                user(3, &[1, 2, 3]),
                user(4, &[]),
            ],
            locations: Vec::<Location>::new(),
            genres: vec![
                Genre {
                    genre_id: 1,
                    name: "Action".to_string(),
                },
                Genre {
                    genre_id: 2,
                    name: "Drama".to_string(),
                },
            ],
            seasons: Vec::<Season>::new(),
        }
    }

    fn engine(settings: PipelineSettings) -> RecommendationEngine {
        RecommendationEngine::new(Arc::new(InMemoryTableSource::new(tables())), settings)
    }

    #[tokio::test]
    async fn test_all_three_recommenders_answer() {
        let settings = PipelineSettings {
            min_support: 0.5,
            min_confidence: 0.5,
            ..PipelineSettings::default()
        };
        let set = engine(settings).recommend(1, 5).await.unwrap();

        assert_eq!(set.user_id, 1);
        assert_eq!(set.collaborative[0], 2);
        assert!(!set.collaborative.contains(&1));
        assert_eq!(set.association, vec![2]);
        assert_eq!(set.content[0], 4);
        assert!(!set.content.contains(&1));
    }

    #[tokio::test]
    async fn test_user_without_ratings_gets_empty_lists() {
        let set = engine(PipelineSettings::default()).recommend(4, 5).await.unwrap();
        assert!(set.is_empty());

        let set = engine(PipelineSettings::default()).recommend(77, 5).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_failing_recommender_is_isolated() {
        let settings = PipelineSettings {
            min_support: 0.0,
            ..PipelineSettings::default()
        };
        let set = engine(settings).recommend(1, 5).await.unwrap();

        assert!(set.association.is_empty());
        assert!(!set.collaborative.is_empty());
        assert!(!set.content.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_settles_to_empty() {
        let outcome = tokio::task::spawn_blocking(|| -> Result<Vec<i32>, RecommenderError> {
            panic!("similarity exploded")
        })
        .await;
        assert!(settle("collaborative", 1, outcome).is_empty());
    }

    #[tokio::test]
    async fn test_zero_count_skips_loading() {
        let set = engine(PipelineSettings::default()).recommend(1, 0).await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_preprocess_failure_fails_request() {
        let mut broken = tables();
        broken.anime.push(anime(1, &[]));
        let engine = RecommendationEngine::new(
            Arc::new(InMemoryTableSource::new(broken)),
            PipelineSettings::default(),
        );

        let err = engine.recommend(1, 5).await.unwrap_err();
        assert!(matches!(err, AppError::Preprocess(_)));
    }

    struct StalledSource;

    #[async_trait::async_trait]
    impl TableSource for StalledSource {
        async fn fetch_ratings(&self) -> AppResult<Vec<Rating>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
        async fn fetch_anime(&self) -> AppResult<Vec<Anime>> {
            Ok(vec![])
        }
        async fn fetch_users(&self) -> AppResult<Vec<User>> {
            Ok(vec![])
        }
        async fn fetch_locations(&self) -> AppResult<Vec<Location>> {
            Ok(vec![])
        }
        async fn fetch_genres(&self) -> AppResult<Vec<Genre>> {
            Ok(vec![])
        }
        async fn fetch_seasons(&self) -> AppResult<Vec<Season>> {
            Ok(vec![])
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable_error() {
        let settings = PipelineSettings {
            timeout: Some(Duration::from_millis(50)),
            ..PipelineSettings::default()
        };
        let engine = RecommendationEngine::new(Arc::new(StalledSource), settings);

        let err = engine.recommend(1, 5).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}
