//! Error taxonomy for the model-update pipeline.

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input record with a bad field count or encoding. Batch-level parsing
    /// skips these; record-level parsing surfaces them.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Hyperparameter candidate failed validation. The candidate is rejected
    /// before any model is produced.
    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// A persisted shard or descriptor did not decode cleanly. Fatal for
    /// that read; never silently substituted.
    #[error("corrupt model: {0}")]
    CorruptModel(String),

    /// Evaluation was asked to score a model against no usable held-out
    /// ratings.
    #[error("evaluation requires a non-empty held-out set")]
    EmptyHeldOut,

    /// Failure inside the factorization solver, propagated uninterpreted.
    #[error("solver failure: {0}")]
    Solver(String),

    /// The downstream update queue rejected a publish.
    #[error("failed to publish model update: {0}")]
    Queue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
