#![allow(dead_code)]

use std::sync::Arc;

use anime_recs::services::{InMemoryTableSource, PipelineSettings, RecommendationEngine};

/// Five anime, five users, seven ratings. List columns are stored as text the
/// way the database exports them.
pub const FIXTURE: &str = r#"{
    "genres": [
        {"genre_id": 1, "name": "Action"},
        {"genre_id": 2, "name": "Romance"},
        {"genre_id": 3, "name": "Fantasy"}
    ],
    "locations": [
        {"location_id": 1, "country": "Japan", "city": "Osaka"}
    ],
    "anime": [
        {"anime_id": 1, "name": "Blade Dance", "genre_ids": "{1}", "studio": "Bones"},
        {"anime_id": 2, "name": "Love Letter", "genre_ids": "[2]"},
        {"anime_id": 3, "name": "Dragon Road", "genre_ids": "[1, 3]"},
        {"anime_id": 4, "name": "Quiet Hearts", "genre_ids": "[2]"},
        {"anime_id": 5, "name": "Iron Fist", "genre_ids": [1]}
    ],
    "users": [
        {"user_id": 1, "username": "aki", "watched_anime": "[1, 2]", "location_id": 1},
        {"user_id": 2, "username": "ben", "watched_anime": "[1, 2]"},
        {"user_id": 3, "username": "chie", "watched_anime": "[1, 3]"},
        {"user_id": 4, "username": "dan", "watched_anime": "[]"},
        {"user_id": 5, "username": "emi", "watched_anime": "{1}"}
    ],
    "ratings": [
        {"rating_id": 1, "user_id": 1, "anime_id": 1, "score": 9, "created_at": "2024-03-01 10:00:00"},
        {"rating_id": 2, "user_id": 1, "anime_id": 2, "score": 3},
        {"rating_id": 3, "user_id": 2, "anime_id": 1, "score": 8},
        {"rating_id": 4, "user_id": 2, "anime_id": 2, "score": 7},
        {"rating_id": 5, "user_id": 2, "anime_id": 5, "score": 9},
        {"rating_id": 6, "user_id": 3, "anime_id": 1, "score": 7},
        {"rating_id": 7, "user_id": 3, "anime_id": 3, "score": 8, "created_at": "yesterday"}
    ]
}"#;

pub fn fixture_source() -> Arc<InMemoryTableSource> {
    Arc::new(InMemoryTableSource::from_json(FIXTURE).expect("fixture parses"))
}

pub fn engine(settings: PipelineSettings) -> Arc<RecommendationEngine> {
    Arc::new(RecommendationEngine::new(fixture_source(), settings))
}

/// Thresholds low enough for the fixture's four non-empty baskets
pub fn permissive_settings() -> PipelineSettings {
    PipelineSettings {
        min_support: 0.4,
        min_confidence: 0.4,
        ..PipelineSettings::default()
    }
}
