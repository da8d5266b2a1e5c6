//! Time-based train / held-out splitting.

use tracing::info;

use crate::types::RatingEvent;

/// Partition a batch at an approximate global time boundary.
///
/// The boundary is `min + fraction * (max - min)` over the batch's
/// timestamps; events strictly before the boundary go to the training
/// subset and everything else, boundary included, to the held-out subset.
/// This is an approximation that assumes roughly uniform timestamps, not an
/// exact percentile split. Either subset may come back empty (in the
/// degenerate all-equal-timestamps case the boundary equals that timestamp,
/// so the training subset is empty) and callers must tolerate that.
pub fn split_new_data(
    events: Vec<RatingEvent>,
    fraction: f64,
) -> (Vec<RatingEvent>, Vec<RatingEvent>) {
    if events.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let min_time = events.iter().map(|e| e.timestamp).min().unwrap();
    let max_time = events.iter().map(|e| e.timestamp).max().unwrap();
    info!(min_time, max_time, "New data timestamp range");

    let boundary = min_time + (fraction * (max_time - min_time) as f64) as i64;
    info!(boundary, "Splitting at timestamp");

    events.into_iter().partition(|e| e.timestamp < boundary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Score;

    fn event(timestamp: i64) -> RatingEvent {
        RatingEvent {
            user: 1,
            item: 10,
            score: Score::Value(1.0),
            timestamp,
        }
    }

    #[test]
    fn test_split_at_computed_boundary() {
        let events = vec![event(100), event(150), event(200)];

        // boundary = 100 + 0.5 * (200 - 100) = 150
        let (train, held_out) = split_new_data(events, 0.5);
        assert_eq!(train.len(), 1);
        assert_eq!(train[0].timestamp, 100);
        assert_eq!(held_out.len(), 2);
    }

    #[test]
    fn test_boundary_event_goes_to_held_out() {
        let events = vec![event(0), event(50), event(100)];

        // boundary = 50; the ts-50 event must never land in train
        let (train, held_out) = split_new_data(events, 0.5);
        assert!(train.iter().all(|e| e.timestamp < 50));
        assert!(held_out.iter().any(|e| e.timestamp == 50));
    }

    #[test]
    fn test_equal_timestamps_leave_one_side_empty() {
        let events = vec![event(42), event(42), event(42)];

        let (train, held_out) = split_new_data(events, 0.5);
        assert!(train.is_empty());
        assert_eq!(held_out.len(), 3);
    }

    #[test]
    fn test_empty_batch() {
        let (train, held_out) = split_new_data(Vec::new(), 0.5);
        assert!(train.is_empty());
        assert!(held_out.is_empty());
    }
}
