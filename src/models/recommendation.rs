use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The three ranked lists produced for one user
///
/// Lists are independent: the same anime may appear in more than one and
/// callers decide how to merge them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub user_id: i32,
    pub collaborative: Vec<i32>,
    pub association: Vec<i32>,
    pub content: Vec<i32>,
}

impl RecommendationSet {
    pub fn empty(user_id: i32) -> Self {
        Self {
            user_id,
            collaborative: Vec::new(),
            association: Vec::new(),
            content: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collaborative.is_empty() && self.association.is_empty() && self.content.is_empty()
    }

    /// Union of the three lists, first occurrence wins
    pub fn merged(&self) -> Vec<i32> {
        let mut seen = HashSet::new();
        self.collaborative
            .iter()
            .chain(&self.association)
            .chain(&self.content)
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Number of reviews that gave a particular score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub score: i32,
    pub count: usize,
}

/// Number of reviews touching anime of a genre
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenrePopularity {
    pub genre: String,
    pub review_count: usize,
}

/// The anime with the best share of positive (> 5) scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositiveAnime {
    pub anime_id: i32,
    pub name: String,
    pub positive_reviews: usize,
    pub total_reviews: usize,
    pub positive_ratio: f64,
}

/// Display aggregates shown next to recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayStats {
    pub rating_histogram: Vec<ScoreBucket>,
    pub genre_popularity: Vec<GenrePopularity>,
    pub most_positive: Option<PositiveAnime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_keeps_first_occurrence_order() {
        let set = RecommendationSet {
            user_id: 1,
            collaborative: vec![4, 2],
            association: vec![2, 9],
            content: vec![9, 4, 7],
        };
        assert_eq!(set.merged(), vec![4, 2, 9, 7]);
    }

    #[test]
    fn test_empty_set() {
        let set = RecommendationSet::empty(3);
        assert!(set.is_empty());
        assert_eq!(set.user_id, 3);
        assert!(set.merged().is_empty());
    }

    #[test]
    fn test_serialization_shape() {
        let set = RecommendationSet {
            user_id: 1,
            collaborative: vec![2],
            association: vec![],
            content: vec![3],
        };
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["collaborative"], serde_json::json!([2]));
        assert_eq!(json["association"], serde_json::json!([]));
        assert_eq!(json["content"], serde_json::json!([3]));
    }
}
