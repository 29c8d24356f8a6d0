use std::collections::{BTreeSet, HashMap};

use crate::models::{
    DisplayStats, GenrePopularity, MergedReview, PositiveAnime, PreprocessedData, ScoreBucket,
};

const MIN_SCORE: i32 = 1;
const MAX_SCORE: i32 = 10;

/// Scores above this count as positive
const POSITIVE_ABOVE: i32 = 5;

pub fn display_stats(data: &PreprocessedData) -> DisplayStats {
    let stats = DisplayStats {
        rating_histogram: rating_histogram(&data.reviews),
        genre_popularity: genre_popularity(&data.reviews),
        most_positive: most_positive(&data.reviews),
    };

    tracing::debug!(
        reviews = data.reviews.len(),
        genres = stats.genre_popularity.len(),
        "Display statistics computed"
    );

    stats
}

/// One bucket per score in 1..=10, empty buckets included
pub fn rating_histogram(reviews: &[MergedReview]) -> Vec<ScoreBucket> {
    let mut counts = [0usize; (MAX_SCORE - MIN_SCORE + 1) as usize];
    let mut out_of_range = 0usize;

    for review in reviews {
        if (MIN_SCORE..=MAX_SCORE).contains(&review.score) {
            counts[(review.score - MIN_SCORE) as usize] += 1;
        } else {
            out_of_range += 1;
        }
    }

    if out_of_range > 0 {
        tracing::warn!(out_of_range, "Ratings outside 1..=10 left out of histogram");
    }

    (MIN_SCORE..=MAX_SCORE)
        .zip(counts)
        .map(|(score, count)| ScoreBucket { score, count })
        .collect()
}

/// Reviews per genre name, most reviewed first, then by name
///
/// A review counts once per distinct genre of its anime.
pub fn genre_popularity(reviews: &[MergedReview]) -> Vec<GenrePopularity> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for review in reviews {
        let genres: BTreeSet<&str> = review.genre_names.iter().map(String::as_str).collect();
        for genre in genres {
            *counts.entry(genre).or_default() += 1;
        }
    }

    let mut popularity: Vec<GenrePopularity> = counts
        .into_iter()
        .map(|(genre, review_count)| GenrePopularity {
            genre: genre.to_string(),
            review_count,
        })
        .collect();
    popularity.sort_by(|a, b| {
        b.review_count
            .cmp(&a.review_count)
            .then_with(|| a.genre.cmp(&b.genre))
    });
    popularity
}

/// Anime with the highest share of scores above 5
///
/// Ties go to the anime with more reviews, then the lower id.
pub fn most_positive(reviews: &[MergedReview]) -> Option<PositiveAnime> {
    let mut tallies: HashMap<i32, (&str, usize, usize)> = HashMap::new();
    for review in reviews {
        let tally = tallies
            .entry(review.anime_id)
            .or_insert((review.anime_name.as_str(), 0, 0));
        if review.score > POSITIVE_ABOVE {
            tally.1 += 1;
        }
        tally.2 += 1;
    }

    tallies
        .into_iter()
        .map(|(anime_id, (name, positive_reviews, total_reviews))| PositiveAnime {
            anime_id,
            name: name.to_string(),
            positive_reviews,
            total_reviews,
            positive_ratio: positive_reviews as f64 / total_reviews as f64,
        })
        .max_by(|a, b| {
            a.positive_ratio
                .total_cmp(&b.positive_ratio)
                .then_with(|| a.total_reviews.cmp(&b.total_reviews))
                .then_with(|| b.anime_id.cmp(&a.anime_id))
        })
}
