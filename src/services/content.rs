//! Content-based recommendations from genre text
//!
//! Each anime is a document whose terms are its genre names. Documents are
//! weighted with TF-IDF, a user's taste is the mean vector of the anime they
//! liked, and candidates are ranked by cosine similarity to that taste.

use std::collections::{BTreeMap, HashMap, HashSet};

use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::models::{AnimeRecord, ParsedRating};
use crate::services::recommendations::RecommenderError;
use crate::services::similarity::{cosine, top_ranked};

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "but", "by", "for", "from",
    "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "other", "so", "some", "than",
    "that", "the", "their", "then", "there", "these", "this", "to", "too", "very", "with",
];

/// Normalises genre names into terms, dropping blanks and stop words
pub fn genre_terms(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| {
            name.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .filter(|term| !term.is_empty() && !ENGLISH_STOP_WORDS.contains(&term.as_str()))
        .collect()
}

/// TF-IDF weights of genre terms, one L2-normalised row per anime
///
/// Uses raw term counts and smoothed idf, `ln((1 + n) / (1 + df)) + 1`.
#[derive(Debug, Clone)]
pub struct GenreTfidf {
    anime_ids: Vec<i32>,
    positions: HashMap<i32, usize>,
    terms: Vec<String>,
    matrix: Array2<f64>,
}

impl GenreTfidf {
    pub fn fit(anime: &[AnimeRecord]) -> Result<Self, RecommenderError> {
        let documents: Vec<Vec<String>> = anime.iter().map(|a| genre_terms(&a.genre_names)).collect();

        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for document in &documents {
            let unique: HashSet<&str> = document.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let terms: Vec<String> = document_frequency.keys().map(|t| t.to_string()).collect();
        let columns: HashMap<&str, usize> = terms
            .iter()
            .enumerate()
            .map(|(col, term)| (term.as_str(), col))
            .collect();

        let n_docs = documents.len() as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|term| {
                let df = document_frequency[term.as_str()] as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let mut weights = vec![0.0; documents.len() * terms.len()];
        for (row, document) in documents.iter().enumerate() {
            for term in document {
                let col = columns[term.as_str()];
                weights[row * terms.len() + col] += idf[col];
            }
        }

        let mut matrix = Array2::from_shape_vec((documents.len(), terms.len()), weights)?;
        for mut row in matrix.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        let anime_ids: Vec<i32> = anime.iter().map(|a| a.anime_id).collect();
        let positions = anime_ids
            .iter()
            .enumerate()
            .map(|(row, id)| (*id, row))
            .collect();

        Ok(Self {
            anime_ids,
            positions,
            terms,
            matrix,
        })
    }

    /// Vocabulary, in column order
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn vector(&self, anime_id: i32) -> Option<ArrayView1<'_, f64>> {
        self.positions
            .get(&anime_id)
            .map(|&row| self.matrix.row(row))
    }

    /// Column-wise mean of the given anime's rows; `None` if none are known
    pub fn profile(&self, anime_ids: &[i32]) -> Option<Array1<f64>> {
        let rows: Vec<usize> = anime_ids
            .iter()
            .filter_map(|id| self.positions.get(id).copied())
            .collect();
        if rows.is_empty() {
            return None;
        }
        self.matrix.select(Axis(0), &rows).mean_axis(Axis(0))
    }

    /// Cosine similarity of `profile` against every anime
    pub fn score(&self, profile: &Array1<f64>) -> Vec<(i32, f64)> {
        self.anime_ids
            .iter()
            .zip(self.matrix.axis_iter(Axis(0)))
            .map(|(id, row)| (*id, cosine(profile.view(), row)))
            .collect()
    }
}

/// Recommends anime whose genres match what `user_id` scored above
/// `like_threshold`
///
/// Anything the user has rated, liked or not, is excluded.
pub fn recommend(
    ratings: &[ParsedRating],
    anime: &[AnimeRecord],
    user_id: i32,
    count: usize,
    like_threshold: i32,
) -> Result<Vec<i32>, RecommenderError> {
    let user_ratings: Vec<&ParsedRating> = ratings.iter().filter(|r| r.user_id == user_id).collect();
    if user_ratings.is_empty() {
        tracing::info!(user_id, "User has not rated any anime; no content recommendations");
        return Ok(Vec::new());
    }

    let liked: Vec<i32> = user_ratings
        .iter()
        .filter(|r| r.score > like_threshold)
        .map(|r| r.anime_id)
        .collect();
    if liked.is_empty() {
        tracing::info!(user_id, like_threshold, "User has no liked anime; no content recommendations");
        return Ok(Vec::new());
    }

    let model = GenreTfidf::fit(anime)?;

    let Some(profile) = model.profile(&liked) else {
        tracing::info!(user_id, "Liked anime missing from genre matrix; no content recommendations");
        return Ok(Vec::new());
    };
    if profile.sum() == 0.0 {
        tracing::info!(user_id, "Taste profile is empty; no content recommendations");
        return Ok(Vec::new());
    }

    let rated: HashSet<i32> = user_ratings.iter().map(|r| r.anime_id).collect();
    let ranked = top_ranked(model.score(&profile), &rated, count);

    tracing::debug!(
        user_id,
        liked = liked.len(),
        terms = model.terms().len(),
        returned = ranked.len(),
        "Content recommendations ready"
    );

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anime(anime_id: i32, genres: &[&str]) -> AnimeRecord {
        AnimeRecord {
            anime_id,
            name: format!("Anime {}", anime_id),
            genre_ids: Vec::new(),
            genre_names: genres.iter().map(|g| g.to_string()).collect(),
            season_ids: Vec::new(),
            is_adult_rated: false,
            is_running: false,
            release_date: None,
            description: String::new(),
            studio: "Unknown".to_string(),
            image_url: None,
            trailer_url: None,
        }
    }

    fn rating(user_id: i32, anime_id: i32, score: i32) -> ParsedRating {
        ParsedRating {
            rating_id: user_id * 1000 + anime_id,
            user_id,
            anime_id,
            score,
            created_at: None,
            updated_at: None,
            review_text: String::new(),
        }
    }

    fn catalogue() -> Vec<AnimeRecord> {
        vec![
            anime(1, &["Action"]),
            anime(2, &["Romance"]),
            anime(3, &["Action", "Fantasy"]),
            anime(4, &["Romance"]),
            anime(5, &["Slice of Life"]),
            anime(6, &[]),
        ]
    }

    #[test]
    fn test_genre_terms_normalise() {
        let names = vec![
            "Slice  of Life".to_string(),
            "ACTION".to_string(),
            " ".to_string(),
            "The".to_string(),
        ];
        assert_eq!(genre_terms(&names), vec!["slice of life", "action"]);
    }

    #[test]
    fn test_tfidf_rows_are_normalised() {
        let model = GenreTfidf::fit(&catalogue()).unwrap();
        assert_eq!(model.terms(), &["action", "fantasy", "romance", "slice of life"]);

        let action = model.vector(1).unwrap();
        assert!((action.dot(&action) - 1.0).abs() < 1e-12);

        // the rarer term weighs more within a row
        let mixed = model.vector(3).unwrap();
        assert!(mixed[1] > mixed[0]);

        let empty = model.vector(6).unwrap();
        assert_eq!(empty.sum(), 0.0);
    }

    #[test]
    fn test_liked_genre_outranks_disliked_genre() {
        let ratings = vec![rating(1, 1, 9), rating(1, 2, 3)];
        let result = recommend(&ratings, &catalogue(), 1, 10, 6).unwrap();

        let pos_action = result.iter().position(|id| *id == 3).unwrap();
        let pos_romance = result.iter().position(|id| *id == 4).unwrap();
        assert_eq!(result[0], 3);
        assert!(pos_action < pos_romance);
    }

    #[test]
    fn test_never_recommends_rated_anime() {
        let ratings = vec![rating(1, 1, 9), rating(1, 2, 3), rating(1, 3, 7)];
        let result = recommend(&ratings, &catalogue(), 1, 10, 6).unwrap();
        assert!(result.iter().all(|id| ![1, 2, 3].contains(id)));
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_empty_cases() {
        let catalogue = catalogue();
        // no ratings
        assert!(recommend(&[], &catalogue, 1, 5, 6).unwrap().is_empty());
        // nothing above threshold
        let lukewarm = vec![rating(1, 1, 6), rating(1, 2, 2)];
        assert!(recommend(&lukewarm, &catalogue, 1, 5, 6).unwrap().is_empty());
        // liked anime has no genres, so the profile is all zeros
        let genreless = vec![rating(1, 6, 10)];
        assert!(recommend(&genreless, &catalogue, 1, 5, 6).unwrap().is_empty());
        // liked anime is not in the catalogue
        let unknown = vec![rating(1, 99, 10)];
        assert!(recommend(&unknown, &catalogue, 1, 5, 6).unwrap().is_empty());
    }

    #[test]
    fn test_count_caps_output() {
        let ratings = vec![rating(1, 1, 9)];
        assert_eq!(recommend(&ratings, &catalogue(), 1, 2, 6).unwrap(), vec![3, 2]);
    }
}
