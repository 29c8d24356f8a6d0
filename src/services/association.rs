//! Association-rule recommendations over watch histories
//!
//! Every user's watched list is one transaction. Apriori finds itemsets
//! watched together by at least `min_support` of users, rules are derived
//! from them, and rules whose antecedent the target user has already
//! watched contribute their consequents.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::models::UserRecord;
use crate::services::recommendations::RecommenderError;

/// Largest itemset the miner grows or splits into rules
///
/// Rule generation enumerates every split of an itemset, so this also
/// bounds the subset masks well inside `u64`.
pub const MAX_ITEMSET_LEN: usize = 16;

/// Itemset → support (fraction of transactions containing it)
pub type FrequentItemsets = BTreeMap<Vec<i32>, f64>;

/// `antecedent ⇒ consequent`, both sorted ascending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationRule {
    pub antecedent: Vec<i32>,
    pub consequent: Vec<i32>,
    /// Support of antecedent ∪ consequent
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

impl AssociationRule {
    /// Rule order used for recommendations
    ///
    /// Confidence descending, then support descending, then the more specific
    /// (longer) antecedent, then antecedent and consequent ids ascending.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| other.support.total_cmp(&self.support))
            .then_with(|| other.antecedent.len().cmp(&self.antecedent.len()))
            .then_with(|| self.antecedent.cmp(&other.antecedent))
            .then_with(|| self.consequent.cmp(&other.consequent))
    }
}

/// Apriori miner with validated thresholds
#[derive(Debug, Clone, Copy)]
pub struct Apriori {
    min_support: f64,
    min_confidence: f64,
    max_len: usize,
}

impl Apriori {
    pub fn new(min_support: f64, min_confidence: f64) -> Result<Self, RecommenderError> {
        for (name, value) in [("min_support", min_support), ("min_confidence", min_confidence)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(RecommenderError::InvalidThreshold { name, value });
            }
        }
        Ok(Self {
            min_support,
            min_confidence,
            max_len: MAX_ITEMSET_LEN,
        })
    }

    /// Stops growing itemsets past `max_len` items, clamped to
    /// `1..=MAX_ITEMSET_LEN`
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.clamp(1, MAX_ITEMSET_LEN);
        self
    }

    /// Level-wise search for every itemset meeting `min_support`
    pub fn frequent_itemsets(&self, transactions: &[BTreeSet<i32>]) -> FrequentItemsets {
        let mut frequent = FrequentItemsets::new();
        if transactions.is_empty() {
            return frequent;
        }
        let total = transactions.len() as f64;

        let mut item_counts: BTreeMap<i32, usize> = BTreeMap::new();
        for transaction in transactions {
            for item in transaction {
                *item_counts.entry(*item).or_default() += 1;
            }
        }

        let mut level: Vec<Vec<i32>> = Vec::new();
        for (item, count) in item_counts {
            let support = count as f64 / total;
            if support >= self.min_support {
                frequent.insert(vec![item], support);
                level.push(vec![item]);
            }
        }

        while level.len() > 1 && level[0].len() < self.max_len {
            let candidates = join_level(&level, &frequent);
            let mut next = Vec::new();

            for candidate in candidates {
                let count = transactions
                    .iter()
                    .filter(|t| candidate.iter().all(|item| t.contains(item)))
                    .count();
                let support = count as f64 / total;
                if support >= self.min_support {
                    frequent.insert(candidate.clone(), support);
                    next.push(candidate);
                }
            }

            level = next;
        }

        frequent
    }

    /// Rules meeting `min_confidence`, in recommendation order
    ///
    /// Itemsets longer than `max_len` are skipped.
    pub fn rules(&self, itemsets: &FrequentItemsets) -> Vec<AssociationRule> {
        let mut rules = Vec::new();

        let oversized = itemsets.keys().filter(|set| set.len() > self.max_len).count();
        if oversized > 0 {
            tracing::warn!(oversized, max_len = self.max_len, "Skipping itemsets too long for rule generation");
        }

        for (itemset, &support) in itemsets
            .iter()
            .filter(|(set, _)| set.len() > 1 && set.len() <= self.max_len)
        {
            let n = itemset.len();
            for mask in 1..(1u64 << n) - 1 {
                let (antecedent, consequent): (Vec<i32>, Vec<i32>) = {
                    let mut lhs = Vec::new();
                    let mut rhs = Vec::new();
                    for (bit, item) in itemset.iter().enumerate() {
                        if mask & (1u64 << bit) != 0 {
                            lhs.push(*item);
                        } else {
                            rhs.push(*item);
                        }
                    }
                    (lhs, rhs)
                };

                let (Some(&antecedent_support), Some(&consequent_support)) =
                    (itemsets.get(&antecedent), itemsets.get(&consequent))
                else {
                    continue;
                };

                let confidence = support / antecedent_support;
                if confidence >= self.min_confidence {
                    rules.push(AssociationRule {
                        antecedent,
                        consequent,
                        support,
                        confidence,
                        lift: confidence / consequent_support,
                    });
                }
            }
        }

        rules.sort_by(|a, b| a.rank(b));
        rules
    }
}

/// Builds the (k+1)-candidates from frequent k-itemsets sharing a k-1 prefix,
/// pruning any candidate with an infrequent k-subset
fn join_level(level: &[Vec<i32>], frequent: &FrequentItemsets) -> Vec<Vec<i32>> {
    let mut candidates = Vec::new();

    for (i, left) in level.iter().enumerate() {
        for right in &level[i + 1..] {
            let k = left.len();
            if left[..k - 1] != right[..k - 1] || left[k - 1] >= right[k - 1] {
                continue;
            }

            let mut candidate = left.clone();
            candidate.push(right[k - 1]);

            let all_subsets_frequent = (0..candidate.len()).all(|skip| {
                let subset: Vec<i32> = candidate
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| *pos != skip)
                    .map(|(_, item)| *item)
                    .collect();
                frequent.contains_key(&subset)
            });

            if all_subsets_frequent {
                candidates.push(candidate);
            }
        }
    }

    candidates
}

/// Walks rules in order, collecting consequents for a user
///
/// Only rules whose antecedent lies inside `watched` apply. Items in
/// `exclude` are never returned; collection stops at `count`.
pub fn apply_rules(
    rules: &[AssociationRule],
    watched: &HashSet<i32>,
    exclude: &HashSet<i32>,
    count: usize,
) -> Vec<i32> {
    let mut picked = Vec::new();
    if count == 0 {
        return picked;
    }

    for rule in rules {
        if !rule.antecedent.iter().all(|item| watched.contains(item)) {
            continue;
        }
        for item in &rule.consequent {
            if !exclude.contains(item) && !picked.contains(item) {
                picked.push(*item);
                if picked.len() == count {
                    return picked;
                }
            }
        }
    }

    picked
}

/// Recommends anime that users with a similar watch history went on to watch
///
/// Anime the user has watched or is currently watching are never returned.
pub fn recommend(
    users: &[UserRecord],
    user_id: i32,
    count: usize,
    min_support: f64,
    min_confidence: f64,
) -> Result<Vec<i32>, RecommenderError> {
    let apriori = Apriori::new(min_support, min_confidence)?;

    let Some(user) = users.iter().find(|u| u.user_id == user_id) else {
        tracing::info!(user_id, "Unknown user; no association recommendations");
        return Ok(Vec::new());
    };
    if user.watched_anime.is_empty() {
        tracing::info!(user_id, "User has not watched any anime; no association recommendations");
        return Ok(Vec::new());
    }

    let transactions: Vec<BTreeSet<i32>> = users
        .iter()
        .filter(|u| !u.watched_anime.is_empty())
        .map(|u| u.watched_anime.iter().copied().collect())
        .collect();

    let itemsets = apriori.frequent_itemsets(&transactions);
    if itemsets.is_empty() {
        tracing::info!(
            transactions = transactions.len(),
            min_support,
            "No frequent itemsets; no association recommendations"
        );
        return Ok(Vec::new());
    }

    let rules = apriori.rules(&itemsets);
    if rules.is_empty() {
        tracing::info!(
            itemsets = itemsets.len(),
            min_confidence,
            "No association rules; no association recommendations"
        );
        return Ok(Vec::new());
    }

    let watched: HashSet<i32> = user.watched_anime.iter().copied().collect();
    let exclude: HashSet<i32> = watched
        .iter()
        .chain(user.watching_anime.iter())
        .copied()
        .collect();

    let picked = apply_rules(&rules, &watched, &exclude, count);

    tracing::debug!(
        user_id,
        transactions = transactions.len(),
        itemsets = itemsets.len(),
        rules = rules.len(),
        returned = picked.len(),
        "Association recommendations ready"
    );

    Ok(picked)
}
