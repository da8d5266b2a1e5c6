//! Reco Gateway ALS Update Pipeline
//!
//! The model-update stage of the Reco Gateway recommendation platform.
//! Given a batch of (user, item, score, timestamp) events, this crate
//! retrains a latent-factor model, selects hyperparameters against a
//! held-out split, persists the winning factor matrices, and publishes
//! incremental per-entity updates for the serving layer.
//!
//! ## Modules
//!
//! - `parser`: raw record parsing (CSV or JSON-array encoded)
//! - `aggregate`: net-score aggregation with delete semantics
//! - `split`: time-boundary train / held-out splitting
//! - `solver`: factorization solver boundary and in-process ALS
//! - `metrics`: held-out AUC and RMSE
//! - `update`: the build / evaluate / publish lifecycle
//! - `codec`: durable factor-shard and descriptor layout
//! - `publish`: incremental update records and the downstream queue
//! - `config`: environment-based configuration
//! - `error`: error taxonomy

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod publish;
pub mod solver;
pub mod split;
pub mod types;
pub mod update;

// Re-export commonly used types
pub use aggregate::aggregate_scores;
pub use codec::{decode_model, encode_model, read_descriptor, ModelDescriptor, DESCRIPTOR_FILE};
pub use config::{AlsConfig, PublishConfig, ServiceConfig};
pub use error::{PipelineError, Result};
pub use parser::{parse_batch, parse_record};
pub use publish::{
    IncrementalPublisher, KafkaUpdateQueue, NoOpUpdateQueue, Role, UpdateQueue, UpdateRecord,
};
pub use solver::{AlsSolver, FactorizationSolver};
pub use split::split_new_data;
pub use types::{
    AggregatedRating, FactorModel, HyperParamGrid, HyperParams, RatingEvent, Score,
};
pub use update::{AlsUpdate, ModelUpdate};
