use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use crate::models::{
    Anime, AnimeRecord, IdList, Location, MergedReview, ParsedRating, PreprocessedData, Rating,
    RawTables, User, UserRecord,
};

/// Studio placeholder for anime without one
pub const UNKNOWN_STUDIO: &str = "Unknown";
/// Name used for genre ids missing from the genres table
pub const UNKNOWN_GENRE: &str = "Unknown genre";

/// Errors that abort a preprocessing pass
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("duplicate key {key} in table '{table}'")]
    DuplicateKey { table: &'static str, key: i32 },

    #[error("malformed id list in {column} of row {row_id}: {value:?}")]
    MalformedList {
        column: &'static str,
        row_id: i32,
        value: String,
    },
}

/// Turns raw tables into the joined, imputed snapshot the recommenders read
///
/// Either every step succeeds or an error is returned; there are no partial
/// results.
pub fn preprocess(tables: RawTables) -> Result<PreprocessedData, PreprocessError> {
    let RawTables {
        ratings,
        anime,
        users,
        locations,
        genres,
        seasons,
    } = tables;

    let genre_names = unique_index("genres", genres.iter().map(|g| (g.genre_id, g.name.as_str())))?;
    let location_index = unique_index("locations", locations.iter().map(|l| (l.location_id, l)))?;

    let anime_records = anime
        .iter()
        .map(|a| build_anime_record(a, &genre_names))
        .collect::<Result<Vec<_>, _>>()?;
    let anime_index = unique_index("anime", anime_records.iter().map(|a| (a.anime_id, a)))?;

    let user_records = users
        .iter()
        .map(|u| build_user_record(u, &location_index))
        .collect::<Result<Vec<_>, _>>()?;
    let user_index = unique_index("users", user_records.iter().map(|u| (u.user_id, u)))?;

    let missing_locations = user_records
        .iter()
        .filter(|u| u.location_id.is_some() && u.location.is_none())
        .count();
    if missing_locations > 0 {
        tracing::debug!(count = missing_locations, "Users reference unknown locations");
    }

    let mut orphaned = 0usize;
    let mut dropped = 0usize;
    let mut kept_ratings = Vec::with_capacity(ratings.len());
    let mut reviews = Vec::with_capacity(ratings.len());

    for raw in &ratings {
        let rating = parse_rating(raw);
        let user = user_index.get(&rating.user_id).copied();
        if user.is_none() {
            orphaned += 1;
        }

        let Some(anime) = anime_index.get(&rating.anime_id).copied() else {
            dropped += 1;
            continue;
        };

        reviews.push(merge_review(&rating, user, anime));
        kept_ratings.push(rating);
    }

    if orphaned > 0 {
        tracing::warn!(
            count = orphaned,
            "Ratings reference users missing from the users table; keeping them without user data"
        );
    }
    if dropped > 0 {
        tracing::debug!(count = dropped, "Dropped ratings for unknown anime");
    }

    attach_averages(&mut reviews);

    tracing::info!(
        reviews = reviews.len(),
        anime = anime_records.len(),
        users = user_records.len(),
        "Preprocessing complete"
    );

    Ok(PreprocessedData {
        reviews,
        ratings: kept_ratings,
        anime: anime_records,
        users: user_records,
        genres,
        seasons,
    })
}

/// Decodes a list column, returning `None` when the text is not a list of ids
///
/// Already-decoded input is returned unchanged. Accepted text forms are
/// `[1, 2]`, `{1,2}`, `(1, 2)`, `1,2`, quoted elements such as `['1', '2']`,
/// and empty/null markers.
pub fn decode_ids(list: &IdList) -> Option<Vec<i32>> {
    let text = match list {
        IdList::Decoded(ids) => return Some(ids.clone()),
        IdList::Encoded(text) => text.trim(),
    };

    if text.is_empty() || matches!(text, "None" | "null" | "NULL") {
        return Some(Vec::new());
    }

    let inner = [('[', ']'), ('{', '}'), ('(', ')')]
        .iter()
        .find_map(|(open, close)| text.strip_prefix(*open)?.strip_suffix(*close))
        .unwrap_or(text);

    inner
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i32>().ok())
        .collect()
}

/// Parses a timestamp column, coercing anything unrecognised to `None`
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn decode_column(
    column: &'static str,
    row_id: i32,
    list: &IdList,
) -> Result<Vec<i32>, PreprocessError> {
    decode_ids(list).ok_or_else(|| PreprocessError::MalformedList {
        column,
        row_id,
        value: match list {
            IdList::Encoded(text) => text.clone(),
            IdList::Decoded(ids) => format!("{:?}", ids),
        },
    })
}

fn unique_index<T>(
    table: &'static str,
    rows: impl Iterator<Item = (i32, T)>,
) -> Result<HashMap<i32, T>, PreprocessError> {
    let mut index = HashMap::new();
    for (key, row) in rows {
        if index.insert(key, row).is_some() {
            return Err(PreprocessError::DuplicateKey { table, key });
        }
    }
    Ok(index)
}

fn build_anime_record(
    anime: &Anime,
    genre_names: &HashMap<i32, &str>,
) -> Result<AnimeRecord, PreprocessError> {
    let genre_ids = decode_column("genre_ids", anime.anime_id, &anime.genre_ids)?;
    let season_ids = decode_column("season_ids", anime.anime_id, &anime.season_ids)?;

    let names = genre_ids
        .iter()
        .map(|id| {
            genre_names
                .get(id)
                .map(|name| name.to_string())
                .unwrap_or_else(|| UNKNOWN_GENRE.to_string())
        })
        .collect();

    Ok(AnimeRecord {
        anime_id: anime.anime_id,
        name: anime.name.clone(),
        genre_ids,
        genre_names: names,
        season_ids,
        is_adult_rated: anime.is_adult_rated.unwrap_or(false),
        is_running: anime.is_running.unwrap_or(false),
        release_date: parse_timestamp(anime.release_date.as_deref()),
        description: anime.description.clone().unwrap_or_default(),
        studio: anime
            .studio
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_STUDIO.to_string()),
        image_url: anime.image_url.clone(),
        trailer_url: anime.trailer_url.clone(),
    })
}

fn build_user_record(
    user: &User,
    locations: &HashMap<i32, &Location>,
) -> Result<UserRecord, PreprocessError> {
    Ok(UserRecord {
        user_id: user.user_id,
        username: user.username.clone(),
        email: user.email.clone(),
        watched_anime: decode_column("watched_anime", user.user_id, &user.watched_anime)?,
        watching_anime: decode_column("watching_anime", user.user_id, &user.watching_anime)?,
        anime_watched_count: user.anime_watched_count,
        anime_watching_count: user.anime_watching_count,
        location_id: user.location_id,
        location: user
            .location_id
            .and_then(|id| locations.get(&id))
            .map(|l| (*l).clone()),
    })
}

fn parse_rating(raw: &Rating) -> ParsedRating {
    ParsedRating {
        rating_id: raw.rating_id,
        user_id: raw.user_id,
        anime_id: raw.anime_id,
        score: raw.score,
        created_at: parse_timestamp(raw.created_at.as_deref()),
        updated_at: parse_timestamp(raw.updated_at.as_deref()),
        review_text: raw.review_text.clone().unwrap_or_default(),
    }
}

fn merge_review(
    rating: &ParsedRating,
    user: Option<&UserRecord>,
    anime: &AnimeRecord,
) -> MergedReview {
    let location = user.and_then(|u| u.location.as_ref());

    MergedReview {
        rating_id: rating.rating_id,
        user_id: rating.user_id,
        anime_id: rating.anime_id,
        score: rating.score,
        created_at: rating.created_at,
        updated_at: rating.updated_at,
        review_text: rating.review_text.clone(),
        username: user.map(|u| u.username.clone()),
        country: location.map(|l| l.country.clone()),
        city: location.and_then(|l| l.city.clone()),
        state: location.and_then(|l| l.state.clone()),
        anime_name: anime.name.clone(),
        studio: anime.studio.clone(),
        description: anime.description.clone(),
        is_adult_rated: anime.is_adult_rated,
        is_running: anime.is_running,
        release_date: anime.release_date,
        genre_ids: anime.genre_ids.clone(),
        genre_names: anime.genre_names.clone(),
        user_average_rating: 0.0,
        anime_average_rating: 0.0,
    }
}

fn attach_averages(reviews: &mut [MergedReview]) {
    let mut by_user: HashMap<i32, (i64, usize)> = HashMap::new();
    let mut by_anime: HashMap<i32, (i64, usize)> = HashMap::new();

    for review in reviews.iter() {
        let user = by_user.entry(review.user_id).or_default();
        user.0 += i64::from(review.score);
        user.1 += 1;

        let anime = by_anime.entry(review.anime_id).or_default();
        anime.0 += i64::from(review.score);
        anime.1 += 1;
    }

    let mean = |(sum, count): (i64, usize)| sum as f64 / count as f64;

    for review in reviews.iter_mut() {
        review.user_average_rating = mean(by_user[&review.user_id]);
        review.anime_average_rating = mean(by_anime[&review.anime_id]);
    }
}
