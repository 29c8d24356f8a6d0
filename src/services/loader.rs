//! Table loading
//!
//! The recommendation core never talks to a database directly. It reads the
//! six input tables through `TableSource`, which keeps the pipeline free of
//! any particular persistence framework and lets tests hand in fixtures.

use std::future::Future;
use std::time::Instant;

use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::{Anime, Genre, Location, Rating, RawTables, Season, User},
};

/// Read-only access to the six tables the pipeline consumes
///
/// An empty table is `Ok(vec![])`; any failure to reach the data is `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TableSource: Send + Sync {
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>>;

    async fn fetch_anime(&self) -> AppResult<Vec<Anime>>;

    async fn fetch_users(&self) -> AppResult<Vec<User>>;

    async fn fetch_locations(&self) -> AppResult<Vec<Location>>;

    async fn fetch_genres(&self) -> AppResult<Vec<Genre>>;

    async fn fetch_seasons(&self) -> AppResult<Vec<Season>>;

    /// Source name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Loads all six tables, failing fast if any one of them cannot be read
pub async fn load_tables(source: &dyn TableSource) -> AppResult<RawTables> {
    let start = Instant::now();

    let (ratings, anime, users, locations, genres, seasons) = tokio::try_join!(
        fetch_table("ratings", source.fetch_ratings()),
        fetch_table("anime", source.fetch_anime()),
        fetch_table("users", source.fetch_users()),
        fetch_table("locations", source.fetch_locations()),
        fetch_table("genres", source.fetch_genres()),
        fetch_table("seasons", source.fetch_seasons()),
    )?;

    tracing::info!(
        source = source.name(),
        ratings = ratings.len(),
        anime = anime.len(),
        users = users.len(),
        locations = locations.len(),
        genres = genres.len(),
        seasons = seasons.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "Tables loaded"
    );

    Ok(RawTables {
        ratings,
        anime,
        users,
        locations,
        genres,
        seasons,
    })
}

async fn fetch_table<T, F>(table: &'static str, fetch: F) -> AppResult<Vec<T>>
where
    F: Future<Output = AppResult<Vec<T>>>,
{
    match fetch.await {
        Ok(rows) => Ok(rows),
        Err(e @ AppError::DataUnavailable { .. }) => Err(e),
        Err(e) => {
            tracing::error!(table, error = %e, "Failed to load table");
            Err(AppError::data_unavailable(table, e))
        }
    }
}

// ============================================================================
// Postgres
// ============================================================================

/// Table source backed by the site's Postgres database
///
/// Column names follow the site schema (camelCase, quoted). Timestamps are
/// selected as text so that unparsable values degrade to `None` during
/// preprocessing instead of failing the whole query.
#[derive(Clone)]
pub struct PgTableSource {
    pool: PgPool,
}

impl PgTableSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    rating_id: i32,
    user_id: i32,
    anime_id: i32,
    score: i32,
    created_at: Option<String>,
    updated_at: Option<String>,
    review_text: Option<String>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            rating_id: row.rating_id,
            user_id: row.user_id,
            anime_id: row.anime_id,
            score: row.score,
            created_at: row.created_at,
            updated_at: row.updated_at,
            review_text: row.review_text,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnimeRow {
    anime_id: i32,
    name: String,
    genre_ids: Option<Vec<i32>>,
    is_adult_rated: Option<bool>,
    is_running: Option<bool>,
    release_date: Option<String>,
    season_ids: Option<Vec<i32>>,
    description: Option<String>,
    image_url: Option<String>,
    trailer_url: Option<String>,
    studio: Option<String>,
}

impl From<AnimeRow> for Anime {
    fn from(row: AnimeRow) -> Self {
        Anime {
            anime_id: row.anime_id,
            name: row.name,
            genre_ids: row.genre_ids.into(),
            is_adult_rated: row.is_adult_rated,
            is_running: row.is_running,
            release_date: row.release_date,
            season_ids: row.season_ids.into(),
            description: row.description,
            image_url: row.image_url,
            trailer_url: row.trailer_url,
            studio: row.studio,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i32,
    username: String,
    email: Option<String>,
    watched_anime: Option<Vec<i32>>,
    watching_anime: Option<Vec<i32>>,
    anime_watched_count: Option<i32>,
    anime_watching_count: Option<i32>,
    location_id: Option<i32>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            watched_anime: row.watched_anime.into(),
            watching_anime: row.watching_anime.into(),
            anime_watched_count: row.anime_watched_count,
            anime_watching_count: row.anime_watching_count,
            location_id: row.location_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    location_id: i32,
    country: String,
    city: Option<String>,
    state: Option<String>,
}

#[derive(sqlx::FromRow)]
struct GenreRow {
    genre_id: i32,
    name: String,
}

#[derive(sqlx::FromRow)]
struct SeasonRow {
    anime_id: i32,
    season_number: i32,
    season_name: Option<String>,
    season_info: Option<String>,
    season_trailer: Option<String>,
    season_image: Option<String>,
}

#[async_trait::async_trait]
impl TableSource for PgTableSource {
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>> {
        let rows = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT "ratingId" AS rating_id, "userId" AS user_id, "animeId" AS anime_id,
                   score, created_at::text AS created_at, updated_at::text AS updated_at,
                   review_text
            FROM ratings
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Rating::from).collect())
    }

    async fn fetch_anime(&self) -> AppResult<Vec<Anime>> {
        let rows = sqlx::query_as::<_, AnimeRow>(
            r#"
            SELECT "animeId" AS anime_id, "animeName" AS name, genres AS genre_ids,
                   is_adult_rated, is_running, "releaseDate"::text AS release_date,
                   seasons AS season_ids, description,
                   image_url_base_anime AS image_url, trailer_url_base_anime AS trailer_url,
                   studio
            FROM anime
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Anime::from).collect())
    }

    async fn fetch_users(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT "userId" AS user_id, "userName" AS username, email,
                   "watchedAnime" AS watched_anime, "watchingAnime" AS watching_anime,
                   anime_watched_count, anime_watching_count, "locationId" AS location_id
            FROM users
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn fetch_locations(&self) -> AppResult<Vec<Location>> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"SELECT "locationId" AS location_id, country, city, state FROM locations"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Location {
                location_id: row.location_id,
                country: row.country,
                city: row.city,
                state: row.state,
            })
            .collect())
    }

    async fn fetch_genres(&self) -> AppResult<Vec<Genre>> {
        let rows = sqlx::query_as::<_, GenreRow>(
            r#"SELECT "genreId" AS genre_id, name FROM genres"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Genre {
                genre_id: row.genre_id,
                name: row.name,
            })
            .collect())
    }

    async fn fetch_seasons(&self) -> AppResult<Vec<Season>> {
        let rows = sqlx::query_as::<_, SeasonRow>(
            r#"
            SELECT "animeId" AS anime_id, "seasonNumber" AS season_number,
                   "seasonName" AS season_name, "seasonInfo" AS season_info,
                   "seasonTrailer" AS season_trailer, "seasonImage" AS season_image
            FROM seasons
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Season {
                anime_id: row.anime_id,
                season_number: row.season_number,
                season_name: row.season_name,
                season_info: row.season_info,
                season_trailer: row.season_trailer,
                season_image: row.season_image,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Table source over tables already held in memory (fixtures, exports)
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableSource {
    tables: RawTables,
}

impl InMemoryTableSource {
    pub fn new(tables: RawTables) -> Self {
        Self { tables }
    }

    /// Parses a JSON document shaped like `RawTables`
    pub fn from_json(json: &str) -> AppResult<Self> {
        let tables = serde_json::from_str(json)
            .map_err(|e| AppError::InvalidInput(format!("Invalid table fixture: {}", e)))?;
        Ok(Self::new(tables))
    }
}

#[async_trait::async_trait]
impl TableSource for InMemoryTableSource {
    async fn fetch_ratings(&self) -> AppResult<Vec<Rating>> {
        Ok(self.tables.ratings.clone())
    }

    async fn fetch_anime(&self) -> AppResult<Vec<Anime>> {
        Ok(self.tables.anime.clone())
    }

    async fn fetch_users(&self) -> AppResult<Vec<User>> {
        Ok(self.tables.users.clone())
    }

    async fn fetch_locations(&self) -> AppResult<Vec<Location>> {
        Ok(self.tables.locations.clone())
    }

    async fn fetch_genres(&self) -> AppResult<Vec<Genre>> {
        Ok(self.tables.genres.clone())
    }

    async fn fetch_seasons(&self) -> AppResult<Vec<Season>> {
        Ok(self.tables.seasons.clone())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
