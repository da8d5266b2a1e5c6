//! Boundary to the matrix-factorization solver.
//!
//! The pipeline treats factorization as an opaque, blocking call: given a
//! set of aggregated (user, item, score) ratings and hyperparameters, the
//! solver returns user and item factor matrices. [`AlsSolver`] is the
//! in-process alternating-least-squares implementation; anything satisfying
//! [`FactorizationSolver`] can stand in for it.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use rand::Rng;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{AggregatedRating, FactorModel};

/// External factorization boundary with explicit- and implicit-mode entry
/// points. Implementations own all optimization logic; callers verify only
/// shape and invariant properties of the output.
pub trait FactorizationSolver {
    /// Explicit-feedback mode: minimize regularized squared error over the
    /// observed scores.
    fn solve_explicit(
        &self,
        ratings: &[AggregatedRating],
        features: usize,
        iterations: usize,
        regularization: f64,
    ) -> Result<FactorModel>;

    /// Implicit-feedback mode: minimize regularized weighted error, where
    /// the weight on each observation grows with score magnitude and
    /// `alpha` scales confidence.
    fn solve_implicit(
        &self,
        ratings: &[AggregatedRating],
        features: usize,
        iterations: usize,
        regularization: f64,
        alpha: f64,
    ) -> Result<FactorModel>;
}

#[derive(Clone, Copy)]
enum Mode {
    Explicit,
    Implicit { alpha: f64 },
}

/// In-process ALS solver over sparse ratings.
///
/// Alternates between re-solving user factors against fixed item factors
/// and vice versa; each per-entity subproblem is a small regularized
/// least-squares system solved by Cholesky decomposition.
#[derive(Debug, Default)]
pub struct AlsSolver;

impl AlsSolver {
    pub fn new() -> Self {
        Self
    }

    fn train(
        &self,
        ratings: &[AggregatedRating],
        features: usize,
        iterations: usize,
        regularization: f64,
        mode: Mode,
    ) -> Result<FactorModel> {
        if ratings.is_empty() {
            return Err(PipelineError::Solver(
                "cannot factorize an empty rating set".to_string(),
            ));
        }

        let indexed = IndexedRatings::new(ratings);
        let num_users = indexed.user_ids.len();
        let num_items = indexed.item_ids.len();

        let mut user_factors = Array2::<f64>::zeros((num_users, features));
        let mut item_factors = Array2::<f64>::zeros((num_items, features));

        let mut rng = rand::thread_rng();
        for value in user_factors.iter_mut().chain(item_factors.iter_mut()) {
            *value = rng.gen_range(-0.1..0.1);
        }

        for iteration in 0..iterations {
            for (u, observed) in indexed.by_user.iter().enumerate() {
                let solved =
                    solve_entity(observed, &item_factors, features, regularization, mode)?;
                user_factors.row_mut(u).assign(&solved);
            }
            for (i, observed) in indexed.by_item.iter().enumerate() {
                let solved =
                    solve_entity(observed, &user_factors, features, regularization, mode)?;
                item_factors.row_mut(i).assign(&solved);
            }

            if iteration % 2 == 0 {
                let loss = reconstruction_loss(&indexed, &user_factors, &item_factors);
                debug!(iteration, loss, "ALS iteration");
            }
        }

        let user_factors = indexed
            .user_ids
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, user_factors.row(idx).to_vec()))
            .collect();
        let item_factors = indexed
            .item_ids
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, item_factors.row(idx).to_vec()))
            .collect();

        Ok(FactorModel {
            rank: features,
            user_factors,
            item_factors,
        })
    }
}

impl FactorizationSolver for AlsSolver {
    fn solve_explicit(
        &self,
        ratings: &[AggregatedRating],
        features: usize,
        iterations: usize,
        regularization: f64,
    ) -> Result<FactorModel> {
        self.train(ratings, features, iterations, regularization, Mode::Explicit)
    }

    fn solve_implicit(
        &self,
        ratings: &[AggregatedRating],
        features: usize,
        iterations: usize,
        regularization: f64,
        alpha: f64,
    ) -> Result<FactorModel> {
        self.train(
            ratings,
            features,
            iterations,
            regularization,
            Mode::Implicit { alpha },
        )
    }
}

/// Ratings re-keyed to dense indices, with per-entity observation lists.
struct IndexedRatings {
    user_ids: Vec<i32>,
    item_ids: Vec<i32>,
    /// Per user index: (item index, score)
    by_user: Vec<Vec<(usize, f64)>>,
    /// Per item index: (user index, score)
    by_item: Vec<Vec<(usize, f64)>>,
}

impl IndexedRatings {
    fn new(ratings: &[AggregatedRating]) -> Self {
        let mut user_ids: Vec<i32> = ratings.iter().map(|r| r.user).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let mut item_ids: Vec<i32> = ratings.iter().map(|r| r.item).collect();
        item_ids.sort_unstable();
        item_ids.dedup();

        let user_index: HashMap<i32, usize> =
            user_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let item_index: HashMap<i32, usize> =
            item_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut by_user = vec![Vec::new(); user_ids.len()];
        let mut by_item = vec![Vec::new(); item_ids.len()];
        for rating in ratings {
            let u = user_index[&rating.user];
            let i = item_index[&rating.item];
            by_user[u].push((i, rating.score));
            by_item[i].push((u, rating.score));
        }

        Self {
            user_ids,
            item_ids,
            by_user,
            by_item,
        }
    }
}

/// Solve one entity's regularized least-squares subproblem against the
/// fixed factors of the other side.
fn solve_entity(
    observed: &[(usize, f64)],
    other_factors: &Array2<f64>,
    features: usize,
    regularization: f64,
    mode: Mode,
) -> Result<Array1<f64>> {
    let mut a = Array2::<f64>::zeros((features, features));
    let mut b = Array1::<f64>::zeros(features);

    for &(other_idx, score) in observed {
        let vec = other_factors.row(other_idx);
        let (weight, target) = match mode {
            Mode::Explicit => (1.0, score),
            Mode::Implicit { alpha } => {
                // Confidence grows with engagement magnitude; the target is
                // the binary preference.
                let confidence = 1.0 + alpha * score.abs();
                (confidence, if score > 0.0 { 1.0 } else { 0.0 })
            }
        };

        for i in 0..features {
            for j in 0..features {
                a[[i, j]] += weight * vec[i] * vec[j];
            }
            b[i] += weight * target * vec[i];
        }
    }

    for i in 0..features {
        a[[i, i]] += regularization;
    }

    solve_least_squares(&a, &b)
}

/// Solve A * x = b by Cholesky decomposition. A is positive definite as
/// long as the regularization term is non-degenerate.
fn solve_least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(PipelineError::Solver(
                        "normal-equation matrix is not positive definite".to_string(),
                    ));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

fn reconstruction_loss(
    indexed: &IndexedRatings,
    user_factors: &Array2<f64>,
    item_factors: &Array2<f64>,
) -> f64 {
    let mut loss = 0.0;
    let mut count = 0usize;

    for (u, observed) in indexed.by_user.iter().enumerate() {
        for &(i, score) in observed {
            let prediction = user_factors.row(u).dot(&item_factors.row(i));
            loss += (score - prediction).powi(2);
            count += 1;
        }
    }

    if count > 0 {
        loss / count as f64
    } else {
        0.0
    }
}
