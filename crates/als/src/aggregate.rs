//! Net-score aggregation for repeated (user, item) events.
//!
//! Combines all events for a pair within one batch into a single net score,
//! honoring deletes. The combine policy depends on the training mode:
//! implicit feedback accumulates a running engagement sum that a delete
//! resets, while explicit feedback is last-write-wins.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{AggregatedRating, RatingEvent, Score};

/// Combine repeated events per (user, item) pair into one net score and
/// drop pairs whose net result is a delete.
///
/// The combine is order-sensitive, so events are first put in timestamp
/// order (a stable sort, so equal timestamps keep arrival order). Output is
/// sorted by (user, item) for deterministic downstream behavior.
pub fn aggregate_scores(events: &[RatingEvent], implicit: bool) -> Vec<AggregatedRating> {
    let mut ordered: Vec<&RatingEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.timestamp);

    let mut combined: HashMap<(i32, i32), Score> = HashMap::new();
    for event in ordered {
        combined
            .entry((event.user, event.item))
            .and_modify(|acc| {
                *acc = if implicit {
                    combine_implicit(*acc, event.score)
                } else {
                    // Last event wins, including a delete overwriting a
                    // prior value.
                    event.score
                };
            })
            .or_insert(event.score);
    }

    let pairs = combined.len();
    let mut ratings: Vec<AggregatedRating> = combined
        .into_iter()
        .filter_map(|((user, item), score)| {
            score.value().map(|score| AggregatedRating { user, item, score })
        })
        .collect();
    ratings.sort_by_key(|rating| (rating.user, rating.item));

    debug!(
        events = events.len(),
        pairs,
        surviving = ratings.len(),
        implicit,
        "Aggregated rating events"
    );
    ratings
}

/// Implicit-mode combine: values sum; a delete wipes accumulated history;
/// a fresh value after a delete restarts the sum.
fn combine_implicit(acc: Score, next: Score) -> Score {
    match (acc, next) {
        (Score::Value(sum), Score::Value(v)) => Score::Value(sum + v),
        (Score::Delete, Score::Value(v)) => Score::Value(v),
        (_, Score::Delete) => Score::Delete,
    }
}
