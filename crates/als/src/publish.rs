//! Incremental model-update publishing.
//!
//! After a winning model is persisted, its factor vectors are re-read from
//! storage and sent to the serving layer one entity at a time: every user
//! factor as a role-"X" record, every item factor as a role-"Y" record.
//! User records can carry a known-items side channel computed from the full
//! data window. Delivery and ack semantics belong to the queue, not to this
//! pipeline.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{self, ModelDescriptor};
use crate::config::PublishConfig;
use crate::error::{PipelineError, Result};
use crate::types::RatingEvent;

/// Which factor matrix a publish record belongs to: "X" for user factors,
/// "Y" for item factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    X,
    Y,
}

/// The unit of incremental update sent to the serving layer per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub role: Role,
    pub id: i32,
    pub vector: Vec<f64>,
    /// Known counterpart ids, attached only where the side channel is
    /// enabled and the entity has historical associations.
    #[serde(rename = "knownIds", default, skip_serializing_if = "Option::is_none")]
    pub known_ids: Option<Vec<i32>>,
}

/// Downstream queue accepting keyed update records.
#[async_trait]
pub trait UpdateQueue: Send + Sync {
    async fn publish(&self, key: &str, record: &UpdateRecord) -> Result<()>;
}

/// Kafka-backed update queue.
pub struct KafkaUpdateQueue {
    producer: FutureProducer,
    topic: String,
}

impl KafkaUpdateQueue {
    pub fn new(brokers: &str, topic: String) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .set("compression.type", "snappy")
            .set("acks", "1")
            .create()
            .map_err(|e| PipelineError::Queue(e.to_string()))?;

        info!(topic = %topic, brokers = %brokers, "Initialized model update producer");

        Ok(Self { producer, topic })
    }
}

#[async_trait]
impl UpdateQueue for KafkaUpdateQueue {
    async fn publish(&self, key: &str, record: &UpdateRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        let kafka_record = FutureRecord::to(&self.topic).key(key).payload(&payload);

        self.producer
            .send(kafka_record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| PipelineError::Queue(err.to_string()))?;

        debug!(
            role = ?record.role,
            id = record.id,
            topic = %self.topic,
            "Published model update"
        );
        Ok(())
    }
}

/// No-op queue for tests and dry runs.
pub struct NoOpUpdateQueue;

#[async_trait]
impl UpdateQueue for NoOpUpdateQueue {
    async fn publish(&self, _key: &str, record: &UpdateRecord) -> Result<()> {
        debug!(role = ?record.role, id = record.id, "NoOp: would publish model update");
        Ok(())
    }
}

/// Emits one update record per persisted factor entry, joining in the
/// known-counterpart side channel where configured.
pub struct IncrementalPublisher {
    config: PublishConfig,
}

impl IncrementalPublisher {
    pub fn new(config: PublishConfig) -> Self {
        Self { config }
    }

    /// Decode the persisted factors and publish them.
    ///
    /// Every decoded user factor and every decoded item factor is emitted
    /// exactly once, regardless of known-counterpart presence; the side
    /// channel only changes record *content* for entities that join the
    /// index.
    pub async fn publish(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
        new_data: &[RatingEvent],
        past_data: &[RatingEvent],
        queue: &dyn UpdateQueue,
    ) -> Result<()> {
        let model = codec::decode_model(descriptor, model_dir)?;

        info!("Sending user / X factors as model updates");
        let known_items = self
            .config
            .known_items
            .then(|| known_counterparts(new_data, past_data, true));
        let sent = publish_side(Role::X, &model.user_factors, known_items.as_ref(), queue).await?;
        info!(count = sent, "Sent user factor updates");

        info!("Sending item / Y factors as model updates");
        let known_users = self
            .config
            .known_users
            .then(|| known_counterparts(new_data, past_data, false));
        let sent = publish_side(Role::Y, &model.item_factors, known_users.as_ref(), queue).await?;
        info!(count = sent, "Sent item factor updates");

        Ok(())
    }
}

async fn publish_side(
    role: Role,
    factors: &HashMap<i32, Vec<f64>>,
    known: Option<&HashMap<i32, HashSet<i32>>>,
    queue: &dyn UpdateQueue,
) -> Result<usize> {
    let mut ids: Vec<i32> = factors.keys().copied().collect();
    ids.sort_unstable();

    for &id in &ids {
        let known_ids = known.and_then(|index| index.get(&id)).map(|set| {
            let mut ids: Vec<i32> = set.iter().copied().collect();
            ids.sort_unstable();
            ids
        });
        let record = UpdateRecord {
            role,
            id,
            vector: factors[&id].clone(),
            known_ids,
        };
        queue.publish(&id.to_string(), &record).await?;
    }

    Ok(ids.len())
}

/// Known-counterpart index over the full data window. A pair that was
/// later deleted still counts: the index tracks historical association,
/// not current score.
fn known_counterparts(
    new_data: &[RatingEvent],
    past_data: &[RatingEvent],
    items_per_user: bool,
) -> HashMap<i32, HashSet<i32>> {
    let mut index: HashMap<i32, HashSet<i32>> = HashMap::new();
    for event in new_data.iter().chain(past_data) {
        let (key, value) = if items_per_user {
            (event.user, event.item)
        } else {
            (event.item, event.user)
        };
        index.entry(key).or_default().insert(value);
    }
    index
}
