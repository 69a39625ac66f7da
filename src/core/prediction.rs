//! Prediction types.

use faer::Col;

/// Result of a grouped-model prediction, split into its two additive parts.
///
/// The point forecast is the sum of the tree-ensemble output and the
/// per-group random-effect mean. Both components are mandatory: dropping the
/// random-effect mean silently degrades accuracy without any error surfacing,
/// so the split is part of the prediction contract rather than an
/// implementation detail.
#[derive(Debug, Clone)]
pub struct ModelPrediction {
    /// Fixed-effect (tree ensemble) contribution per row.
    pub fixed: Col<f64>,
    /// Random-effect mean contribution per row.
    pub random_mean: Col<f64>,
}

impl ModelPrediction {
    /// Create a prediction from its two components.
    ///
    /// # Panics
    /// Panics if the components have different lengths.
    pub fn new(fixed: Col<f64>, random_mean: Col<f64>) -> Self {
        assert_eq!(
            fixed.nrows(),
            random_mean.nrows(),
            "prediction component length mismatch"
        );
        Self { fixed, random_mean }
    }

    /// The point forecast: fixed + random-effect mean, per row.
    pub fn point(&self) -> Col<f64> {
        Col::from_fn(self.fixed.nrows(), |i| self.fixed[i] + self.random_mean[i])
    }

    /// Number of predicted rows.
    pub fn len(&self) -> usize {
        self.fixed.nrows()
    }

    /// Returns true if there are no predictions.
    pub fn is_empty(&self) -> bool {
        self.fixed.nrows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_sums_components() {
        let pred = ModelPrediction::new(Col::from_fn(3, |i| i as f64), Col::from_fn(3, |_| 0.5));
        let point = pred.point();
        assert!((point[0] - 0.5).abs() < 1e-12);
        assert!((point[2] - 2.5).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn test_mismatched_components_panic() {
        let _ = ModelPrediction::new(Col::zeros(2), Col::zeros(3));
    }
}
