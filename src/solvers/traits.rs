//! Core traits for grouped estimators.

use faer::{Col, Mat};
use thiserror::Error;

use crate::core::ModelPrediction;

/// Errors that can occur while fitting or scoring a grouped model.
#[derive(Debug, Error)]
pub enum ModelFitError {
    #[error("dimension mismatch: X has {x_rows} rows but y has {y_len} elements")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("grouping vector has {groups_len} entries for {x_rows} rows")]
    GroupingMismatch { x_rows: usize, groups_len: usize },

    #[error("grouping vector is not dense: index {index} out of {n_groups} groups")]
    InvalidGrouping { index: usize, n_groups: usize },

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("degenerate grouping: {n_groups} groups over {n_obs} observations \
             cannot separate group variance")]
    DegenerateGroups { n_groups: usize, n_obs: usize },

    #[error("variance components failed to converge after {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("matrix is singular or nearly singular")]
    SingularMatrix,

    #[error("country {code} was not part of the training grouping")]
    UnknownGroup { code: String },
}

/// An estimator with a per-group random-effect structure.
///
/// Follows the fit-then-predict pattern: fitting consumes a purely numeric
/// feature matrix, a response, and a dense zero-based grouping vector, and
/// returns a fitted model.
pub trait GroupedRegressor {
    /// The type of the fitted model.
    type Fitted: FittedGroupedRegressor;

    /// Fit the model.
    ///
    /// # Arguments
    /// * `x` - Feature matrix of shape (n_samples, n_features)
    /// * `y` - Response vector of length n_samples
    /// * `groups` - Zero-based dense group index per row
    fn fit(&self, x: &Mat<f64>, y: &Col<f64>, groups: &[usize])
        -> Result<Self::Fitted, ModelFitError>;
}

/// A fitted grouped model that can score new rows.
pub trait FittedGroupedRegressor {
    /// Predict new rows, returning the fixed-effect and random-effect-mean
    /// components separately.
    ///
    /// `groups` indexes into the grouping the model was trained with; rows
    /// whose group had no training observations receive a zero random-effect
    /// mean.
    fn predict(&self, x: &Mat<f64>, groups: &[usize]) -> Result<ModelPrediction, ModelFitError>;

    /// Number of groups in the trained random-effect structure.
    fn n_groups(&self) -> usize;
}

/// Validate that `groups` is row-parallel with `x` and dense over
/// `0..n_groups`, returning the group count.
pub(crate) fn validate_groups(n_rows: usize, groups: &[usize]) -> Result<usize, ModelFitError> {
    if groups.len() != n_rows {
        return Err(ModelFitError::GroupingMismatch {
            x_rows: n_rows,
            groups_len: groups.len(),
        });
    }

    let n_groups = groups.iter().copied().max().map_or(0, |g| g + 1);
    let mut seen = vec![false; n_groups];
    for &g in groups {
        seen[g] = true;
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(ModelFitError::InvalidGrouping {
            index: missing,
            n_groups,
        });
    }
    Ok(n_groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_groups_dense() {
        assert_eq!(validate_groups(4, &[0, 1, 1, 2]).unwrap(), 3);
    }

    #[test]
    fn test_validate_groups_gap() {
        let result = validate_groups(3, &[0, 2, 2]);
        assert!(matches!(
            result,
            Err(ModelFitError::InvalidGrouping { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_groups_length() {
        let result = validate_groups(3, &[0, 1]);
        assert!(matches!(result, Err(ModelFitError::GroupingMismatch { .. })));
    }
}
