use serde::{Deserialize, Serialize};

/// A list-valued column as handed over by the data source
///
/// Postgres array columns arrive already decoded, while exports and older
/// rows may carry the textual form (`"[1, 2]"`, `"{1,2}"`). Both shapes are
/// accepted here; the preprocessor turns either into a `Vec<i32>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    Decoded(Vec<i32>),
    Encoded(String),
}

impl Default for IdList {
    fn default() -> Self {
        IdList::Decoded(Vec::new())
    }
}

impl From<Vec<i32>> for IdList {
    fn from(ids: Vec<i32>) -> Self {
        IdList::Decoded(ids)
    }
}

impl From<Option<Vec<i32>>> for IdList {
    fn from(ids: Option<Vec<i32>>) -> Self {
        IdList::Decoded(ids.unwrap_or_default())
    }
}

impl From<&str> for IdList {
    fn from(text: &str) -> Self {
        IdList::Encoded(text.to_string())
    }
}

/// One user review of one anime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rating_id: i32,
    pub user_id: i32,
    pub anime_id: i32,
    /// Score in 1..=10
    pub score: i32,
    /// Raw timestamp text, parsed during preprocessing
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub review_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anime {
    pub anime_id: i32,
    pub name: String,
    /// Ordered genre identifiers
    #[serde(default)]
    pub genre_ids: IdList,
    #[serde(default)]
    pub is_adult_rated: Option<bool>,
    #[serde(default)]
    pub is_running: Option<bool>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub season_ids: IdList,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub studio: Option<String>,
}

/// A site user, without credential material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i32,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Finished anime; disjoint from `watching_anime`
    #[serde(default)]
    pub watched_anime: IdList,
    #[serde(default)]
    pub watching_anime: IdList,
    #[serde(default)]
    pub anime_watched_count: Option<i32>,
    #[serde(default)]
    pub anime_watching_count: Option<i32>,
    #[serde(default)]
    pub location_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub genre_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: i32,
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Keyed by (anime_id, season_number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub anime_id: i32,
    pub season_number: i32,
    #[serde(default)]
    pub season_name: Option<String>,
    #[serde(default)]
    pub season_info: Option<String>,
    #[serde(default)]
    pub season_trailer: Option<String>,
    #[serde(default)]
    pub season_image: Option<String>,
}

/// The six input tables, exactly as fetched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTables {
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub anime: Vec<Anime>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub seasons: Vec<Season>,
}
