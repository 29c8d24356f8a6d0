use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Genre, Location, Season};

/// A rating with parsed timestamps and imputed review text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRating {
    pub rating_id: i32,
    pub user_id: i32,
    pub anime_id: i32,
    pub score: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub review_text: String,
}

/// An anime with decoded lists and genre ids resolved to names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimeRecord {
    pub anime_id: i32,
    pub name: String,
    pub genre_ids: Vec<i32>,
    /// Parallel to `genre_ids`; unknown ids become "Unknown genre"
    pub genre_names: Vec<String>,
    pub season_ids: Vec<i32>,
    pub is_adult_rated: bool,
    pub is_running: bool,
    pub release_date: Option<DateTime<Utc>>,
    pub description: String,
    pub studio: String,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
}

/// A user with decoded watch lists and their location, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i32,
    pub username: String,
    pub email: Option<String>,
    pub watched_anime: Vec<i32>,
    pub watching_anime: Vec<i32>,
    pub anime_watched_count: Option<i32>,
    pub anime_watching_count: Option<i32>,
    pub location_id: Option<i32>,
    pub location: Option<Location>,
}

/// One rating joined with its user, location and anime
///
/// User and location fields are `None` when the rating points at a user
/// that the users table does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReview {
    pub rating_id: i32,
    pub user_id: i32,
    pub anime_id: i32,
    pub score: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub review_text: String,

    pub username: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,

    pub anime_name: String,
    pub studio: String,
    pub description: String,
    pub is_adult_rated: bool,
    pub is_running: bool,
    pub release_date: Option<DateTime<Utc>>,
    pub genre_ids: Vec<i32>,
    pub genre_names: Vec<String>,

    /// Mean score given by this row's user
    pub user_average_rating: f64,
    /// Mean score received by this row's anime
    pub anime_average_rating: f64,
}

/// Everything the recommenders read, rebuilt on every run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessedData {
    pub reviews: Vec<MergedReview>,
    /// Ratings that survived the join against the anime table
    pub ratings: Vec<ParsedRating>,
    pub anime: Vec<AnimeRecord>,
    pub users: Vec<UserRecord>,
    pub genres: Vec<Genre>,
    pub seasons: Vec<Season>,
}

impl PreprocessedData {
    pub fn user(&self, user_id: i32) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn anime(&self, anime_id: i32) -> Option<&AnimeRecord> {
        self.anime.iter().find(|a| a.anime_id == anime_id)
    }
}
