//! Item-based collaborative filtering
//!
//! If many users who rated anime A also rated anime B, a user who rated A is
//! pointed at B. Anime are compared by the cosine of their score columns in
//! the user-item matrix.
//!
//! Unrated cells are filled with 0 before the cosine is taken, so "not
//! rated" counts the same as a very low score. This favours widely rated
//! anime; centring scores or restricting the cosine to co-rated users
//! would change rankings and is deliberately not done here.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ndarray::{Array1, Array2};

use crate::models::ParsedRating;
use crate::services::recommendations::RecommenderError;
use crate::services::similarity::{pairwise_cosine, top_ranked};

/// Dense anime × anime cosine similarity over zero-filled score columns
#[derive(Debug, Clone)]
pub struct ItemSimilarity {
    anime_ids: Vec<i32>,
    positions: HashMap<i32, usize>,
    matrix: Array2<f64>,
}

impl ItemSimilarity {
    /// Builds the model from ratings; repeated (user, anime) pairs are averaged
    pub fn from_ratings(ratings: &[ParsedRating]) -> Result<Self, RecommenderError> {
        let mut cells: BTreeMap<(i32, i32), (f64, usize)> = BTreeMap::new();
        let mut users = BTreeSet::new();

        for rating in ratings {
            let cell = cells.entry((rating.anime_id, rating.user_id)).or_default();
            cell.0 += f64::from(rating.score);
            cell.1 += 1;
            users.insert(rating.user_id);
        }

        let anime_ids: Vec<i32> = cells
            .keys()
            .map(|(anime_id, _)| *anime_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let positions: HashMap<i32, usize> = anime_ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        let user_positions: HashMap<i32, usize> = users
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();

        let mut scores = vec![0.0; anime_ids.len() * users.len()];
        for ((anime_id, user_id), (sum, count)) in &cells {
            let offset = positions[anime_id] * users.len() + user_positions[user_id];
            scores[offset] = sum / *count as f64;
        }

        let item_user = Array2::from_shape_vec((anime_ids.len(), users.len()), scores)?;
        let matrix = pairwise_cosine(&item_user);

        tracing::debug!(
            anime = anime_ids.len(),
            users = users.len(),
            "Item similarity matrix built"
        );

        Ok(Self {
            anime_ids,
            positions,
            matrix,
        })
    }

    /// Anime covered by the model, ascending
    pub fn anime_ids(&self) -> &[i32] {
        &self.anime_ids
    }

    pub fn similarity(&self, a: i32, b: i32) -> Option<f64> {
        let row = *self.positions.get(&a)?;
        let col = *self.positions.get(&b)?;
        Some(self.matrix[[row, col]])
    }

}

/// Recommends anime similar to everything `user_id` has rated
///
/// Each rated anime contributes its full similarity row with equal weight,
/// regardless of the score the user gave it. When no unrated anime shares a
/// rater with the user's anime (for instance the user is the only one who
/// rated them) there is no signal and the result is empty.
pub fn recommend(
    ratings: &[ParsedRating],
    user_id: i32,
    count: usize,
) -> Result<Vec<i32>, RecommenderError> {
    let rated: BTreeSet<i32> = ratings
        .iter()
        .filter(|r| r.user_id == user_id)
        .map(|r| r.anime_id)
        .collect();

    if rated.is_empty() {
        tracing::info!(user_id, "User has not rated any anime; no collaborative recommendations");
        return Ok(Vec::new());
    }

    let model = ItemSimilarity::from_ratings(ratings)?;
    let mut scores = Array1::<f64>::zeros(model.anime_ids.len());
    let mut matched = 0usize;

    for anime_id in &rated {
        match model.positions.get(anime_id) {
            Some(&row) => {
                scores += &model.matrix.row(row);
                matched += 1;
            }
            None => {
                tracing::warn!(user_id, anime_id, "Rated anime missing from similarity matrix");
            }
        }
    }

    if matched == 0 {
        tracing::info!(user_id, "No rated anime usable for similarity; no collaborative recommendations");
        return Ok(Vec::new());
    }

    let exclude: HashSet<i32> = rated.into_iter().collect();
    let has_signal = model
        .anime_ids
        .iter()
        .zip(scores.iter())
        .any(|(id, score)| !exclude.contains(id) && *score > 0.0);
    if !has_signal {
        tracing::info!(user_id, "Rated anime share no raters with other anime; no collaborative recommendations");
        return Ok(Vec::new());
    }

    let ranked = top_ranked(
        model.anime_ids.iter().copied().zip(scores.iter().copied()),
        &exclude,
        count,
    );

    tracing::debug!(user_id, matched, returned = ranked.len(), "Collaborative recommendations ready");

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn sample_ratings() -> Vec<ParsedRating> {
        vec![
            rating(1, 10, 9),
            rating(1, 11, 8),
            rating(2, 10, 8),
            rating(2, 11, 9),
            rating(2, 12, 3),
            rating(3, 12, 9),
            rating(3, 13, 8),
            rating(4, 10, 7),
            rating(4, 14, 6),
        ]
    }

    #[test]
    fn test_two_user_scenario() {
        let ratings = vec![rating(1, 1, 8), rating(2, 1, 9), rating(2, 2, 7)];
        let result = recommend(&ratings, 1, 1).unwrap();
        assert_eq!(result, vec![2]);
    }

    #[test]
    fn test_similarity_matrix_is_symmetric_with_unit_diagonal() {
        let model = ItemSimilarity::from_ratings(&sample_ratings()).unwrap();
        let ids = model.anime_ids().to_vec();
        assert_eq!(ids, vec![10, 11, 12, 13, 14]);

        for &a in &ids {
            assert_eq!(model.similarity(a, a), Some(1.0));
            for &b in &ids {
                let ab = model.similarity(a, b).unwrap();
                let ba = model.similarity(b, a).unwrap();
                assert!((ab - ba).abs() < 1e-12);
                assert!((0.0..=1.0).contains(&ab));
            }
        }
        assert_eq!(model.similarity(10, 99), None);
    }

    #[test]
    fn test_never_recommends_rated_anime() {
        let ratings = sample_ratings();
        for user_id in 1..=4 {
            let rated: HashSet<i32> = ratings
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| r.anime_id)
                .collect();
            let result = recommend(&ratings, user_id, 10).unwrap();
            assert!(result.iter().all(|id| !rated.contains(id)));
        }
    }

    #[test]
    fn test_user_without_ratings_gets_nothing() {
        assert!(recommend(&sample_ratings(), 99, 5).unwrap().is_empty());
        assert!(recommend(&[], 1, 5).unwrap().is_empty());
    }

    #[test]
    fn test_ranking_follows_accumulated_similarity() {
        // 14 is close to 10 through user 4; 12 overlaps weakly with both 10 and 11
        // through user 2; 13 shares no raters with either
        let result = recommend(&sample_ratings(), 1, 10).unwrap();
        assert_eq!(result, vec![14, 12, 13]);
    }

    #[test]
    fn test_sole_rater_gets_nothing() {
        // user 1 is the only one who rated anime 1, so it is orthogonal to 2 and 3
        let ratings = vec![rating(1, 1, 8), rating(2, 2, 9), rating(2, 3, 7)];
        assert!(recommend(&ratings, 1, 5).unwrap().is_empty());
    }

    #[test]
    fn test_count_caps_output() {
        assert_eq!(recommend(&sample_ratings(), 1, 1).unwrap().len(), 1);
        assert!(recommend(&sample_ratings(), 1, 0).unwrap().is_empty());
    }
}
