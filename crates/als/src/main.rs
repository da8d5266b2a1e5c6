//! ALS update service: runs one full model-update cycle.
//!
//! Reads the new batch, splits it by time, drives build + evaluate across
//! the configured hyperparameter grid, promotes the winning candidate, and
//! publishes its factors as incremental updates.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use reco_gateway_als::{
    parse_batch, AlsConfig, AlsSolver, AlsUpdate, KafkaUpdateQueue, ModelDescriptor, ModelUpdate,
    NoOpUpdateQueue, PipelineError, RatingEvent, ServiceConfig, UpdateQueue,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .json()
        .init();

    let als_config = AlsConfig::from_env()?;
    als_config.validate()?;
    let service = ServiceConfig::from_env()?;

    info!(
        implicit = als_config.implicit,
        iterations = als_config.iterations,
        "Starting ALS model update cycle"
    );

    let new_data = read_batch(&service.new_data)
        .with_context(|| format!("reading new data from {}", service.new_data.display()))?;
    let past_data = match &service.past_data {
        Some(path) => read_batch(path)
            .with_context(|| format!("reading past data from {}", path.display()))?,
        None => Vec::new(),
    };
    info!(
        new = new_data.len(),
        past = past_data.len(),
        "Loaded rating events"
    );

    let update = AlsUpdate::new(als_config.clone(), AlsSolver::new());
    let (train, held_out) = update.split_new_data_to_train_test(new_data.clone());
    info!(train = train.len(), held_out = held_out.len(), "Split new data");

    let mut best: Option<(f64, ModelDescriptor, PathBuf)> = None;
    for (index, params) in als_config.hyper_grid.candidates().iter().enumerate() {
        let candidate_dir = service.work_dir.join(format!("candidate-{index}"));

        let descriptor = match update.build_model(&train, params, &candidate_dir) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, ?params, "Candidate build failed");
                continue;
            }
        };

        // An unscorable candidate is still usable when there is nothing to
        // score against; it just cannot beat a scored one.
        let score = match update.evaluate(&descriptor, &candidate_dir, &held_out) {
            Ok(score) => score,
            Err(PipelineError::EmptyHeldOut) => {
                warn!(?params, "No held-out data to score candidate");
                f64::NEG_INFINITY
            }
            Err(e) => {
                warn!(error = %e, ?params, "Candidate evaluation failed");
                continue;
            }
        };
        info!(score, ?params, "Scored candidate");

        if best.as_ref().map_or(true, |(high, _, _)| score > *high) {
            best = Some((score, descriptor, candidate_dir));
        }
    }

    let (score, descriptor, model_dir) =
        best.ok_or_else(|| anyhow::anyhow!("no hyperparameter candidate produced a model"))?;
    info!(
        score,
        model_dir = %model_dir.display(),
        "Selected winning candidate"
    );
    promote(&service.work_dir, &model_dir)?;

    let queue: Box<dyn UpdateQueue> = match &service.kafka_brokers {
        Some(brokers) => Box::new(KafkaUpdateQueue::new(
            brokers,
            service.update_topic.clone(),
        )?),
        None => {
            info!("No Kafka brokers configured; model updates will not be sent");
            Box::new(NoOpUpdateQueue)
        }
    };
    update
        .publish_model_data(&descriptor, &model_dir, &new_data, &past_data, queue.as_ref())
        .await?;

    info!("Model update cycle complete");
    Ok(())
}

fn read_batch(path: &Path) -> anyhow::Result<Vec<RatingEvent>> {
    let file = File::open(path)?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<_>>()?;
    Ok(parse_batch(lines.iter().map(String::as_str)))
}

/// Point the active-model marker at the winning candidate. The marker is
/// written to a temporary file and renamed into place, so a crash mid-cycle
/// leaves the previous model active.
fn promote(work_dir: &Path, model_dir: &Path) -> anyhow::Result<()> {
    let marker = work_dir.join("MODEL");
    let staging = work_dir.join("MODEL.tmp");

    let mut file = File::create(&staging)?;
    writeln!(file, "{}", model_dir.display())?;
    file.sync_all()?;
    fs::rename(&staging, &marker)?;

    info!(marker = %marker.display(), "Promoted winning model");
    Ok(())
}
