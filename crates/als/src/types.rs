//! Core data types shared across the update pipeline.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};

/// A rating value, or an explicit marker that the user-item association
/// should be deleted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Value(f64),
    Delete,
}

impl Score {
    pub fn is_delete(&self) -> bool {
        matches!(self, Score::Delete)
    }

    /// The numeric value, if this is not a delete marker.
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Value(v) => Some(*v),
            Score::Delete => None,
        }
    }
}

/// One (user, item, score, timestamp) event from the input stream.
/// Events are ephemeral: consumed once per batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingEvent {
    pub user: i32,
    pub item: i32,
    pub score: Score,
    pub timestamp: i64,
}

/// Net score for one distinct (user, item) pair after aggregation.
/// Pairs whose net result was a delete are never materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRating {
    pub user: i32,
    pub item: i32,
    pub score: f64,
}

/// One hyperparameter candidate for the factorization solver.
///
/// `alpha` scales confidence in implicit-feedback mode and is unused in
/// explicit mode, but is validated in both.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperParams {
    pub features: usize,
    pub regularization: f64,
    pub alpha: f64,
}

impl HyperParams {
    pub fn new(features: usize, regularization: f64, alpha: f64) -> Self {
        Self {
            features,
            regularization,
            alpha,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.features == 0 {
            return Err(PipelineError::InvalidHyperparameter(
                "features must be > 0".to_string(),
            ));
        }
        if !(self.regularization >= 0.0) {
            return Err(PipelineError::InvalidHyperparameter(format!(
                "regularization must be >= 0, got {}",
                self.regularization
            )));
        }
        if !(self.alpha > 0.0) {
            return Err(PipelineError::InvalidHyperparameter(format!(
                "alpha must be > 0, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Candidate value lists searched by the external hyperparameter driver.
/// The driver enumerates the cross-product and keeps the best-scoring
/// candidate; the search policy itself lives outside this crate.
#[derive(Debug, Clone)]
pub struct HyperParamGrid {
    pub features: Vec<usize>,
    pub regularization: Vec<f64>,
    pub alpha: Vec<f64>,
}

impl HyperParamGrid {
    /// All candidate combinations, features-major.
    pub fn candidates(&self) -> Vec<HyperParams> {
        let mut out =
            Vec::with_capacity(self.features.len() * self.regularization.len() * self.alpha.len());
        for &features in &self.features {
            for &regularization in &self.regularization {
                for &alpha in &self.alpha {
                    out.push(HyperParams::new(features, regularization, alpha));
                }
            }
        }
        out
    }
}

/// Latent factor matrices keyed by entity id.
///
/// Invariant: every vector has length exactly `rank`; ids are unique per
/// side.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorModel {
    pub rank: usize,
    pub user_factors: HashMap<i32, Vec<f64>>,
    pub item_factors: HashMap<i32, Vec<f64>>,
}

impl FactorModel {
    /// Predicted affinity as the inner product of the two factor vectors.
    /// `None` if either entity is unknown to the model.
    pub fn predict(&self, user: i32, item: i32) -> Option<f64> {
        let user_vec = self.user_factors.get(&user)?;
        let item_vec = self.item_factors.get(&item)?;
        Some(user_vec.iter().zip(item_vec.iter()).map(|(x, y)| x * y).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyperparams_validation() {
        assert!(HyperParams::new(10, 0.001, 1.0).validate().is_ok());
        // regularization of exactly zero is allowed
        assert!(HyperParams::new(1, 0.0, 40.0).validate().is_ok());

        assert!(HyperParams::new(0, 0.001, 1.0).validate().is_err());
        assert!(HyperParams::new(10, -0.1, 1.0).validate().is_err());
        assert!(HyperParams::new(10, 0.001, 0.0).validate().is_err());
        assert!(HyperParams::new(10, 0.001, -1.0).validate().is_err());
    }

    #[test]
    fn test_grid_cross_product() {
        let grid = HyperParamGrid {
            features: vec![10, 20],
            regularization: vec![0.001, 0.01, 0.1],
            alpha: vec![1.0],
        };

        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates[0], HyperParams::new(10, 0.001, 1.0));
        assert_eq!(candidates[5], HyperParams::new(20, 0.1, 1.0));
    }

    #[test]
    fn test_predict_inner_product() {
        let mut user_factors = HashMap::new();
        user_factors.insert(1, vec![1.0, 2.0]);
        let mut item_factors = HashMap::new();
        item_factors.insert(10, vec![3.0, 0.5]);

        let model = FactorModel {
            rank: 2,
            user_factors,
            item_factors,
        };

        assert_eq!(model.predict(1, 10), Some(4.0));
        assert_eq!(model.predict(2, 10), None);
        assert_eq!(model.predict(1, 11), None);
    }
}
