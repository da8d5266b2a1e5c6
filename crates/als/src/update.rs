//! Model-update lifecycle: split, build, evaluate, publish.
//!
//! [`ModelUpdate`] is the contract between a model family and the external
//! hyperparameter-search driver: the driver repeatedly supplies a candidate,
//! invokes build + evaluate, and keeps the best-scoring candidate.
//! [`AlsUpdate`] is the matrix-factorization specialization; other model
//! families can implement the same trait independently.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::aggregate::aggregate_scores;
use crate::codec::{self, ModelDescriptor};
use crate::config::AlsConfig;
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::publish::{IncrementalPublisher, UpdateQueue};
use crate::solver::FactorizationSolver;
use crate::split::split_new_data;
use crate::types::{HyperParams, RatingEvent};

/// Lifecycle operations a model family exposes to the update driver.
#[async_trait]
pub trait ModelUpdate {
    /// Partition a new batch into training and held-out subsets.
    fn split_new_data_to_train_test(
        &self,
        new_data: Vec<RatingEvent>,
    ) -> (Vec<RatingEvent>, Vec<RatingEvent>);

    /// Build and persist a candidate model under `candidate_dir`.
    fn build_model(
        &self,
        train: &[RatingEvent],
        params: &HyperParams,
        candidate_dir: &Path,
    ) -> Result<ModelDescriptor>;

    /// Score a persisted model against held-out data. Higher is better,
    /// uniformly across training modes.
    fn evaluate(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
        held_out: &[RatingEvent],
    ) -> Result<f64>;

    /// Send per-entity factor updates for a persisted model downstream.
    async fn publish_model_data(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
        new_data: &[RatingEvent],
        past_data: &[RatingEvent],
        queue: &dyn UpdateQueue,
    ) -> Result<()>;
}

/// ALS specialization of the update lifecycle.
pub struct AlsUpdate<S> {
    config: AlsConfig,
    solver: S,
}

impl<S: FactorizationSolver> AlsUpdate<S> {
    pub fn new(config: AlsConfig, solver: S) -> Self {
        Self { config, solver }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }
}

#[async_trait]
impl<S: FactorizationSolver + Send + Sync> ModelUpdate for AlsUpdate<S> {
    fn split_new_data_to_train_test(
        &self,
        new_data: Vec<RatingEvent>,
    ) -> (Vec<RatingEvent>, Vec<RatingEvent>) {
        split_new_data(new_data, self.config.test_fraction)
    }

    fn build_model(
        &self,
        train: &[RatingEvent],
        params: &HyperParams,
        candidate_dir: &Path,
    ) -> Result<ModelDescriptor> {
        info!(?params, "Building model");
        params.validate()?;

        let ratings = aggregate_scores(train, self.config.implicit);
        let model = if self.config.implicit {
            self.solver.solve_implicit(
                &ratings,
                params.features,
                self.config.iterations,
                params.regularization,
                params.alpha,
            )?
        } else {
            self.solver.solve_explicit(
                &ratings,
                params.features,
                self.config.iterations,
                params.regularization,
            )?
        };

        codec::encode_model(&model, params, self.config.implicit, candidate_dir)
    }

    /// Implicit mode returns the AUC ranking metric directly. Explicit mode
    /// returns `1 / RMSE`, so the maximizing driver sees higher-is-better
    /// in both modes; an RMSE of exactly zero (a perfect fit, only seen
    /// with degenerate held-out sets) maps to `f64::MAX` rather than
    /// dividing by zero.
    fn evaluate(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
        held_out: &[RatingEvent],
    ) -> Result<f64> {
        info!("Evaluating model");
        let ratings = aggregate_scores(held_out, self.config.implicit);
        if ratings.is_empty() {
            return Err(PipelineError::EmptyHeldOut);
        }

        let model = codec::decode_model(descriptor, model_dir)?;
        if self.config.implicit {
            let auc = metrics::auc(&model, &ratings).ok_or(PipelineError::EmptyHeldOut)?;
            info!(auc, "AUC");
            Ok(auc)
        } else {
            let rmse = metrics::rmse(&model, &ratings).ok_or(PipelineError::EmptyHeldOut)?;
            info!(rmse, "RMSE");
            if rmse == 0.0 {
                Ok(f64::MAX)
            } else {
                Ok(1.0 / rmse)
            }
        }
    }

    async fn publish_model_data(
        &self,
        descriptor: &ModelDescriptor,
        model_dir: &Path,
        new_data: &[RatingEvent],
        past_data: &[RatingEvent],
        queue: &dyn UpdateQueue,
    ) -> Result<()> {
        IncrementalPublisher::new(self.config.publish.clone())
            .publish(descriptor, model_dir, new_data, past_data, queue)
            .await
    }
}
