use std::cmp::Ordering;
use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, Axis};

/// Cosine similarity of two vectors; 0.0 when either has zero magnitude
pub fn cosine(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (norm_a * norm_b)
}

/// Pairwise cosine similarity between the rows of `matrix`
///
/// Rows with zero magnitude get similarity 0.0 with everything, including
/// themselves. Every other row has 1.0 on the diagonal.
pub fn pairwise_cosine(matrix: &Array2<f64>) -> Array2<f64> {
    let norms: Vec<f64> = matrix
        .axis_iter(Axis(0))
        .map(|row| row.dot(&row).sqrt())
        .collect();

    let mut similarity = matrix.dot(&matrix.t());
    for ((i, j), value) in similarity.indexed_iter_mut() {
        let denom = norms[i] * norms[j];
        *value = if denom == 0.0 {
            0.0
        } else if i == j {
            1.0
        } else {
            (*value / denom).clamp(-1.0, 1.0)
        };
    }
    similarity
}

/// Orders candidates by score, highest first, ties by id ascending
///
/// Ids in `exclude` are skipped and at most `count` ids are returned.
pub fn top_ranked(
    scores: impl IntoIterator<Item = (i32, f64)>,
    exclude: &HashSet<i32>,
    count: usize,
) -> Vec<i32> {
    let mut candidates: Vec<(i32, f64)> = scores
        .into_iter()
        .filter(|(id, _)| !exclude.contains(id))
        .collect();

    candidates.sort_by(|(id_a, score_a), (id_b, score_b)| {
        match score_b.total_cmp(score_a) {
            Ordering::Equal => id_a.cmp(id_b),
            other => other,
        }
    });

    candidates.into_iter().take(count).map(|(id, _)| id).collect()
}
