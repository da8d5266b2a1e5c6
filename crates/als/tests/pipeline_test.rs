//! End-to-end update-cycle tests over the real solver, codec, and
//! publisher, with an in-memory stand-in for the downstream queue.

use std::sync::Mutex;

use async_trait::async_trait;

use reco_gateway_als::{
    aggregate_scores, parse_batch, AlsConfig, AlsSolver, AlsUpdate, HyperParams, ModelUpdate,
    PipelineError, Result, Role, Score, UpdateQueue, UpdateRecord,
};

struct MemoryQueue {
    records: Mutex<Vec<UpdateRecord>>,
}

impl MemoryQueue {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn records(&self) -> Vec<UpdateRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateQueue for MemoryQueue {
    async fn publish(&self, _key: &str, record: &UpdateRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn explicit_config() -> AlsConfig {
    let mut config = AlsConfig::default();
    config.implicit = false;
    config.iterations = 5;
    config.test_fraction = 0.5;
    config
}

/// The worked scenario: a delete in the held-out subset must not affect
/// aggregation within the training subset.
#[test]
fn deletes_do_not_cross_the_split_boundary() {
    let batch = parse_batch(vec!["1,10,4.0,100", "1,10,,200", "2,20,3.0,150"]);
    assert_eq!(batch.len(), 3);

    let update = AlsUpdate::new(explicit_config(), AlsSolver::new());
    let (train, held_out) = update.split_new_data_to_train_test(batch);

    // boundary = 100 + 0.5 * (200 - 100) = 150
    assert_eq!(train.len(), 1);
    assert_eq!(train[0].timestamp, 100);
    let mut held_out_times: Vec<i64> = held_out.iter().map(|e| e.timestamp).collect();
    held_out_times.sort_unstable();
    assert_eq!(held_out_times, vec![150, 200]);

    // the delete at ts 200 lives in held-out; train still sees 4.0
    let train_ratings = aggregate_scores(&train, false);
    assert_eq!(train_ratings.len(), 1);
    assert_eq!((train_ratings[0].user, train_ratings[0].item), (1, 10));
    assert_eq!(train_ratings[0].score, 4.0);

    // and within held-out the delete wins over nothing else for (1, 10)
    let held_out_ratings = aggregate_scores(&held_out, false);
    assert_eq!(held_out_ratings.len(), 1);
    assert_eq!(
        (held_out_ratings[0].user, held_out_ratings[0].item),
        (2, 20)
    );
}

#[test]
fn scenario_builds_but_cannot_score_disjoint_held_out() {
    let batch = parse_batch(vec!["1,10,4.0,100", "1,10,,200", "2,20,3.0,150"]);
    let update = AlsUpdate::new(explicit_config(), AlsSolver::new());
    let (train, held_out) = update.split_new_data_to_train_test(batch);

    let dir = tempfile::tempdir().unwrap();
    let descriptor = update
        .build_model(&train, &HyperParams::new(2, 0.1, 1.0), dir.path())
        .unwrap();
    assert_eq!(descriptor.x_ids, vec![1]);
    assert_eq!(descriptor.y_ids, vec![10]);

    // held-out survives aggregation but shares no entity with the model
    let result = update.evaluate(&descriptor, dir.path(), &held_out);
    assert!(matches!(result, Err(PipelineError::EmptyHeldOut)));
}

#[tokio::test]
async fn full_cycle_explicit() {
    let batch = parse_batch(vec![
        "1,10,4.0,100",
        "1,11,2.0,110",
        "2,10,5.0,120",
        "2,11,1.0,130",
        "3,10,3.0,140",
        "1,10,4.5,200",
        "2,11,1.5,210",
    ]);

    let update = AlsUpdate::new(explicit_config(), AlsSolver::new());
    let (train, held_out) = update.split_new_data_to_train_test(batch.clone());
    assert!(!train.is_empty());
    assert!(!held_out.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let descriptor = update
        .build_model(&train, &HyperParams::new(2, 0.1, 1.0), dir.path())
        .unwrap();
    let score = update.evaluate(&descriptor, dir.path(), &held_out).unwrap();
    assert!(score.is_finite());
    assert!(score > 0.0);

    let queue = MemoryQueue::new();
    update
        .publish_model_data(&descriptor, dir.path(), &batch, &[], &queue)
        .await
        .unwrap();

    let records = queue.records();
    let x_count = records.iter().filter(|r| r.role == Role::X).count();
    let y_count = records.iter().filter(|r| r.role == Role::Y).count();
    assert_eq!(x_count, descriptor.x_ids.len());
    assert_eq!(y_count, descriptor.y_ids.len());

    // every trained user interacted with something, so with the side
    // channel on, every X record carries known items
    assert!(records
        .iter()
        .filter(|r| r.role == Role::X)
        .all(|r| r.known_ids.is_some()));
    assert!(records
        .iter()
        .filter(|r| r.role == Role::Y)
        .all(|r| r.known_ids.is_none()));
}

#[tokio::test]
async fn full_cycle_implicit() {
    let batch = parse_batch(vec![
        "1,10,1.0,100",
        "1,10,1.0,110",
        "1,11,1.0,120",
        "2,10,1.0,130",
        "2,12,1.0,140",
        "3,11,1.0,150",
        "1,12,1.0,200",
        "2,11,1.0,210",
    ]);

    let mut config = AlsConfig::default();
    config.implicit = true;
    config.iterations = 5;
    config.test_fraction = 0.5;
    let update = AlsUpdate::new(config, AlsSolver::new());

    let (train, held_out) = update.split_new_data_to_train_test(batch.clone());
    let dir = tempfile::tempdir().unwrap();
    let descriptor = update
        .build_model(&train, &HyperParams::new(2, 0.1, 40.0), dir.path())
        .unwrap();
    assert!(descriptor.implicit);
    assert_eq!(descriptor.alpha, Some(40.0));

    // AUC is a probability
    let score = update.evaluate(&descriptor, dir.path(), &held_out).unwrap();
    assert!((0.0..=1.0).contains(&score));
}

/// Repeated implicit events for one pair sum before training; an
/// interleaved delete resets the running total.
#[test]
fn implicit_aggregation_feeds_net_sums_to_the_solver() {
    let batch = parse_batch(vec![
        "1,10,3.0,100",
        "1,10,,110",
        "1,10,4.0,120",
        "2,10,2.0,130",
        "2,10,2.0,140",
    ]);

    let ratings = aggregate_scores(&batch, true);
    assert_eq!(ratings.len(), 2);
    assert_eq!(ratings[0].score, 4.0);
    assert_eq!(ratings[1].score, 4.0);
}

/// A malformed line in a real feed is dropped, not fatal.
#[test]
fn malformed_lines_are_skipped() {
    let batch = parse_batch(vec!["1,10,4.0,100", "garbage", "2,20,,150"]);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].score, Score::Delete);
}
