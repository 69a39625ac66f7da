//! Gradient-boosted trees with a per-group random intercept.
//!
//! Each boosting round fits a regression tree to the residuals of the
//! current combined prediction (ensemble + random effects), then re-estimates
//! the per-group intercepts as shrunken group means of the remaining
//! residual, with the shrinkage ratio tracking the current variance
//! components. Prediction exposes the two parts separately so callers can
//! honor the fixed-plus-random contract.

use faer::{Col, Mat};
use log::debug;

use crate::core::ModelPrediction;
use crate::solvers::traits::{
    validate_groups, FittedGroupedRegressor, GroupedRegressor, ModelFitError,
};
use crate::solvers::tree::RegressionTree;

/// Floor for the group variance so the shrinkage ratio stays finite.
const GROUP_VARIANCE_FLOOR: f64 = 1e-12;

/// Boosted-tree estimator with a grouped random-effect structure.
///
/// Hyperparameter defaults are the production set: squared-error objective,
/// learning rate 0.05, depth 6, minimum 5 samples per leaf.
///
/// # Example
///
/// ```rust,ignore
/// use panelcast::solvers::{MixedBoostRegressor, GroupedRegressor, FittedGroupedRegressor};
///
/// let model = MixedBoostRegressor::new(120, 0.05, 6, 5);
/// let fitted = model.fit(&x, &y, &groups)?;
/// let pred = fitted.predict(&x_new, &groups_new)?;
/// let point = pred.point();
/// ```
#[derive(Debug, Clone)]
pub struct MixedBoostRegressor {
    /// Number of boosting rounds for a plain fit.
    pub n_rounds: usize,
    /// Shrinkage applied to each tree's contribution.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum number of samples per leaf.
    pub min_data_in_leaf: usize,
}

impl Default for MixedBoostRegressor {
    fn default() -> Self {
        Self {
            n_rounds: 300,
            learning_rate: 0.05,
            max_depth: 6,
            min_data_in_leaf: 5,
        }
    }
}

impl MixedBoostRegressor {
    /// Create an estimator with explicit hyperparameters.
    pub fn new(n_rounds: usize, learning_rate: f64, max_depth: usize, min_data_in_leaf: usize) -> Self {
        Self {
            n_rounds,
            learning_rate,
            max_depth,
            min_data_in_leaf,
        }
    }

    /// Fit with a held-out validation set, recording the validation mean
    /// squared error after every round and stopping early once `patience`
    /// rounds pass without improvement.
    ///
    /// `n_groups` spans both row sets; validation rows whose group has no
    /// training observations score with a zero random-effect mean. Returns
    /// the fitted model together with the per-round validation error curve.
    #[allow(clippy::too_many_arguments)]
    pub fn fit_with_validation(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        groups: &[usize],
        x_val: &Mat<f64>,
        y_val: &Col<f64>,
        groups_val: &[usize],
        n_groups: usize,
        patience: usize,
    ) -> Result<(FittedMixedBoost, Vec<f64>), ModelFitError> {
        check_bounds(x.nrows(), groups, n_groups)?;
        check_bounds(x_val.nrows(), groups_val, n_groups)?;
        let validation = Some(Validation {
            x: x_val,
            y: y_val,
            groups: groups_val,
            patience,
        });
        self.fit_engine(x, y, groups, n_groups, validation)
    }

    /// The shared boosting loop.
    fn fit_engine(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        groups: &[usize],
        n_groups: usize,
        validation: Option<Validation<'_>>,
    ) -> Result<(FittedMixedBoost, Vec<f64>), ModelFitError> {
        let n = x.nrows();
        if n != y.nrows() {
            return Err(ModelFitError::DimensionMismatch {
                x_rows: n,
                y_len: y.nrows(),
            });
        }
        if n < 2 {
            return Err(ModelFitError::InsufficientObservations { needed: 2, got: n });
        }

        let mut group_sizes = vec![0usize; n_groups];
        for &g in groups {
            group_sizes[g] += 1;
        }
        let observed_groups = group_sizes.iter().filter(|&&c| c > 0).count().max(1);

        let base_score = y.iter().sum::<f64>() / n as f64;
        let y_var = y.iter().map(|&v| (v - base_score) * (v - base_score)).sum::<f64>()
            / n as f64;

        let mut fixed = vec![base_score; n];
        let mut effects = vec![0.0f64; n_groups];
        let mut sigma2_residual = (0.5 * y_var).max(GROUP_VARIANCE_FLOOR);
        let mut sigma2_group = (0.5 * y_var).max(GROUP_VARIANCE_FLOOR);

        // Estimate the random effects once before the first tree so the
        // ensemble starts from group-centered residuals.
        update_effects(
            y,
            &fixed,
            groups,
            &group_sizes,
            observed_groups,
            &mut effects,
            &mut sigma2_residual,
            &mut sigma2_group,
        );

        let mut trees: Vec<RegressionTree> = Vec::new();
        let mut val_fixed: Vec<f64> = validation
            .as_ref()
            .map(|v| vec![base_score; v.x.nrows()])
            .unwrap_or_default();
        let mut val_curve: Vec<f64> = Vec::new();
        let mut best_error = f64::INFINITY;
        let mut rounds_since_best = 0usize;

        for round in 0..self.n_rounds {
            let residual: Vec<f64> = (0..n)
                .map(|i| y[i] - fixed[i] - effects[groups[i]])
                .collect();

            let tree = RegressionTree::fit(x, &residual, self.max_depth, self.min_data_in_leaf);
            for (i, f) in fixed.iter_mut().enumerate() {
                *f += self.learning_rate * tree.predict_row(x, i);
            }

            update_effects(
                y,
                &fixed,
                groups,
                &group_sizes,
                observed_groups,
                &mut effects,
                &mut sigma2_residual,
                &mut sigma2_group,
            );

            if let Some(val) = &validation {
                for (i, f) in val_fixed.iter_mut().enumerate() {
                    *f += self.learning_rate * tree.predict_row(val.x, i);
                }
                let mut sse = 0.0;
                for i in 0..val.x.nrows() {
                    let e = val.y[i] - val_fixed[i] - effects[val.groups[i]];
                    sse += e * e;
                }
                let error = sse / val.x.nrows() as f64;
                val_curve.push(error);

                if error < best_error {
                    best_error = error;
                    rounds_since_best = 0;
                } else {
                    rounds_since_best += 1;
                }
                trees.push(tree);
                if rounds_since_best >= val.patience {
                    debug!(
                        "early stop after round {} (best validation mse {:.6})",
                        round + 1,
                        best_error
                    );
                    break;
                }
            } else {
                trees.push(tree);
            }
        }

        let fitted = FittedMixedBoost {
            base_score,
            trees,
            learning_rate: self.learning_rate,
            random_effects: effects,
            sigma2_residual,
            sigma2_group,
            n_features: x.ncols(),
            n_groups,
        };
        Ok((fitted, val_curve))
    }
}

impl GroupedRegressor for MixedBoostRegressor {
    type Fitted = FittedMixedBoost;

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        groups: &[usize],
    ) -> Result<Self::Fitted, ModelFitError> {
        let n_groups = validate_groups(x.nrows(), groups)?;
        let (fitted, _) = self.fit_engine(x, y, groups, n_groups, None)?;
        Ok(fitted)
    }
}

/// Validate that `groups` is row-parallel and within `0..n_groups`.
fn check_bounds(n_rows: usize, groups: &[usize], n_groups: usize) -> Result<(), ModelFitError> {
    if groups.len() != n_rows {
        return Err(ModelFitError::GroupingMismatch {
            x_rows: n_rows,
            groups_len: groups.len(),
        });
    }
    if let Some(&bad) = groups.iter().find(|&&g| g >= n_groups) {
        return Err(ModelFitError::InvalidGrouping {
            index: bad,
            n_groups,
        });
    }
    Ok(())
}

/// Validation inputs for the early-stopped fit.
struct Validation<'a> {
    x: &'a Mat<f64>,
    y: &'a Col<f64>,
    groups: &'a [usize],
    patience: usize,
}

/// A fitted boosted model with its random-effect structure.
#[derive(Debug, Clone)]
pub struct FittedMixedBoost {
    base_score: f64,
    trees: Vec<RegressionTree>,
    learning_rate: f64,
    random_effects: Vec<f64>,
    sigma2_residual: f64,
    sigma2_group: f64,
    n_features: usize,
    n_groups: usize,
}

impl FittedGroupedRegressor for FittedMixedBoost {
    fn predict(&self, x: &Mat<f64>, groups: &[usize]) -> Result<ModelPrediction, ModelFitError> {
        let n = x.nrows();
        if x.ncols() != self.n_features {
            return Err(ModelFitError::DimensionMismatch {
                x_rows: x.ncols(),
                y_len: self.n_features,
            });
        }
        if groups.len() != n {
            return Err(ModelFitError::GroupingMismatch {
                x_rows: n,
                groups_len: groups.len(),
            });
        }
        if let Some(&bad) = groups.iter().find(|&&g| g >= self.n_groups) {
            return Err(ModelFitError::InvalidGrouping {
                index: bad,
                n_groups: self.n_groups,
            });
        }

        let fixed = Col::from_fn(n, |i| {
            let mut score = self.base_score;
            for tree in &self.trees {
                score += self.learning_rate * tree.predict_row(x, i);
            }
            score
        });
        let random_mean = Col::from_fn(n, |i| self.random_effects[groups[i]]);
        Ok(ModelPrediction::new(fixed, random_mean))
    }

    fn n_groups(&self) -> usize {
        self.n_groups
    }
}

impl FittedMixedBoost {
    /// Number of trees in the ensemble.
    pub fn n_rounds(&self) -> usize {
        self.trees.len()
    }

    /// Residual variance component at the last round.
    pub fn sigma2_residual(&self) -> f64 {
        self.sigma2_residual
    }

    /// Group variance component at the last round.
    pub fn sigma2_group(&self) -> f64 {
        self.sigma2_group
    }
}

/// Re-estimate the per-group intercepts as shrunken group means of
/// `y - fixed`, then refresh the variance components from the result.
#[allow(clippy::too_many_arguments)]
fn update_effects(
    y: &Col<f64>,
    fixed: &[f64],
    groups: &[usize],
    group_sizes: &[usize],
    observed_groups: usize,
    effects: &mut [f64],
    sigma2_residual: &mut f64,
    sigma2_group: &mut f64,
) {
    let n = fixed.len();
    let n_groups = group_sizes.len();
    let ratio = *sigma2_residual / *sigma2_group;

    let mut sums = vec![0.0f64; n_groups];
    for i in 0..n {
        sums[groups[i]] += y[i] - fixed[i];
    }
    for g in 0..n_groups {
        effects[g] = if group_sizes[g] == 0 {
            0.0
        } else {
            sums[g] / (group_sizes[g] as f64 + ratio)
        };
    }

    let mut sse = 0.0;
    for i in 0..n {
        let e = y[i] - fixed[i] - effects[groups[i]];
        sse += e * e;
    }
    *sigma2_residual = (sse / n as f64).max(GROUP_VARIANCE_FLOOR);

    let sum_b2: f64 = effects.iter().map(|&b| b * b).sum();
    *sigma2_group = (sum_b2 / observed_groups as f64).max(GROUP_VARIANCE_FLOOR);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nonlinear fixed signal plus strong group offsets.
    fn grouped_data() -> (Mat<f64>, Col<f64>, Vec<usize>) {
        let n = 60;
        let x = Mat::from_fn(n, 2, |i, j| {
            if j == 0 {
                (i % 15) as f64
            } else {
                ((i * 7) % 11) as f64
            }
        });
        let groups: Vec<usize> = (0..n).map(|i| i / 20).collect();
        let y = Col::from_fn(n, |i| {
            let offset = [4.0, 0.0, -4.0][i / 20];
            let step = if x[(i, 0)] > 7.0 { 2.0 } else { -2.0 };
            offset + step
        });
        (x, y, groups)
    }

    #[test]
    fn test_training_error_decreases() {
        let (x, y, groups) = grouped_data();

        let short = MixedBoostRegressor::new(2, 0.1, 3, 2)
            .fit(&x, &y, &groups)
            .unwrap();
        let long = MixedBoostRegressor::new(60, 0.1, 3, 2)
            .fit(&x, &y, &groups)
            .unwrap();

        let mse = |fitted: &FittedMixedBoost| {
            let pred = fitted.predict(&x, &groups).unwrap().point();
            (0..y.nrows())
                .map(|i| (y[i] - pred[i]) * (y[i] - pred[i]))
                .sum::<f64>()
                / y.nrows() as f64
        };
        assert!(mse(&long) < mse(&short));
        assert!(mse(&long) < 0.5);
    }

    #[test]
    fn test_random_effects_capture_group_offsets() {
        let (x, y, groups) = grouped_data();
        let fitted = MixedBoostRegressor::new(40, 0.1, 3, 2)
            .fit(&x, &y, &groups)
            .unwrap();

        let pred = fitted.predict(&x, &groups).unwrap();
        // Group 0 sits well above group 2.
        assert!(pred.random_mean[0] > pred.random_mean[59]);
    }

    #[test]
    fn test_early_stopping_caps_rounds() {
        let (x, y, groups) = grouped_data();
        // An anti-correlated held-out response: every round that improves the
        // training fit worsens validation, so the first round stays best and
        // patience runs out.
        let y_val = Col::from_fn(y.nrows(), |i| -y[i]);

        let (fitted, curve) = MixedBoostRegressor::new(200, 0.3, 3, 2)
            .fit_with_validation(&x, &y, &groups, &x, &y_val, &groups, 3, 5)
            .unwrap();

        assert_eq!(fitted.n_rounds(), curve.len());
        assert!(
            fitted.n_rounds() < 200,
            "worsening validation error should trigger early stopping, ran {}",
            fitted.n_rounds()
        );
    }

    #[test]
    fn test_unseen_group_scores_zero_random_effect() {
        let (x, y, groups) = grouped_data();
        // Declare one extra group that never occurs in training.
        let (fitted, _) = MixedBoostRegressor::new(10, 0.1, 3, 2)
            .fit_with_validation(&x, &y, &groups, &x, &y, &groups, 4, 5)
            .unwrap();

        let x_new = Mat::from_fn(1, 2, |_, _| 1.0);
        let pred = fitted.predict(&x_new, &[3]).unwrap();
        assert!((pred.random_mean[0] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_group_index_out_of_bounds() {
        let (x, y, groups) = grouped_data();
        let fitted = MixedBoostRegressor::new(5, 0.1, 3, 2)
            .fit(&x, &y, &groups)
            .unwrap();

        let result = fitted.predict(&x, &vec![99; x.nrows()]);
        assert!(matches!(result, Err(ModelFitError::InvalidGrouping { .. })));
    }
}
