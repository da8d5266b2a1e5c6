//! Held-out ranking and error metrics.
//!
//! Both metrics skip held-out pairs the model cannot score (unknown user or
//! item) and return `None` when nothing scorable remains, so callers can
//! map that to the empty-held-out sentinel.

use std::collections::{HashMap, HashSet};

use crate::types::{AggregatedRating, FactorModel};

/// Mean per-user area under the ROC curve: for each held-out user, the
/// probability that a positively-interacted item outranks a non-interacted
/// one under the model's predicted affinity. Ties count half.
///
/// Exhaustive over the model's item set; large catalogs should be
/// subsampled upstream.
pub fn auc(model: &FactorModel, held_out: &[AggregatedRating]) -> Option<f64> {
    let mut item_ids: Vec<i32> = model.item_factors.keys().copied().collect();
    item_ids.sort_unstable();

    let mut positives: HashMap<i32, HashSet<i32>> = HashMap::new();
    for rating in held_out {
        if rating.score > 0.0 && model.item_factors.contains_key(&rating.item) {
            positives.entry(rating.user).or_default().insert(rating.item);
        }
    }

    let mut total = 0.0;
    let mut users = 0usize;

    for (user, positive_items) in &positives {
        let user_vec = match model.user_factors.get(user) {
            Some(vec) => vec,
            None => continue,
        };
        let negatives: Vec<i32> = item_ids
            .iter()
            .copied()
            .filter(|item| !positive_items.contains(item))
            .collect();
        if negatives.is_empty() {
            continue;
        }

        // positives and negatives both come from the model's item set
        let affinity = |item: i32| -> f64 {
            model.item_factors[&item]
                .iter()
                .zip(user_vec)
                .map(|(x, y)| x * y)
                .sum()
        };

        let mut correct = 0.0;
        for &positive in positive_items {
            let positive_score = affinity(positive);
            for &negative in &negatives {
                let negative_score = affinity(negative);
                if positive_score > negative_score {
                    correct += 1.0;
                } else if positive_score == negative_score {
                    correct += 0.5;
                }
            }
        }

        total += correct / (positive_items.len() * negatives.len()) as f64;
        users += 1;
    }

    if users == 0 {
        None
    } else {
        Some(total / users as f64)
    }
}

/// Root-mean-squared error of predicted vs actual scores over the held-out
/// pairs the model can score.
pub fn rmse(model: &FactorModel, held_out: &[AggregatedRating]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;

    for rating in held_out {
        if let Some(prediction) = model.predict(rating.user, rating.item) {
            sum += (prediction - rating.score).powi(2);
            count += 1;
        }
    }

    if count == 0 {
        None
    } else {
        Some((sum / count as f64).sqrt())
    }
}
