//! Pipeline options and configuration.

use thiserror::Error;

/// Configuration options for the forecasting pipeline.
///
/// Defaults mirror the production configuration: a 30% missing-value
/// threshold, 49 retained covariates, 3-fold cross-validation over at most
/// 300 boosting rounds with early-stopping patience 5, and the fixed
/// boosting hyperparameters (squared-error objective, learning rate 0.05,
/// depth 6, minimum 5 samples per leaf).
#[derive(Debug, Clone)]
pub struct ForecastOptions {
    /// Drop covariates whose missing fraction exceeds this (default: 0.3).
    pub missing_threshold: f64,
    /// Number of covariates retained by feature selection (default: 49).
    pub n_features: usize,
    /// Number of cross-validation folds (default: 3).
    pub cv_folds: usize,
    /// Ceiling on boosting rounds during cross-validation (default: 300).
    pub max_boost_rounds: usize,
    /// Early-stopping patience in rounds (default: 5).
    pub early_stopping_rounds: usize,
    /// Boosting shrinkage factor (default: 0.05).
    pub learning_rate: f64,
    /// Maximum tree depth (default: 6).
    pub max_depth: usize,
    /// Minimum number of samples per leaf (default: 5).
    pub min_data_in_leaf: usize,
    /// Seed for fold shuffling and mutual-information jitter (default: 1).
    pub seed: u64,
    /// Iteration cap for the mixed-model variance-component loop
    /// (default: 500).
    pub mixed_max_iterations: usize,
    /// Relative convergence tolerance for the variance components
    /// (default: 1e-6).
    pub mixed_tolerance: f64,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            missing_threshold: 0.3,
            n_features: 49,
            cv_folds: 3,
            max_boost_rounds: 300,
            early_stopping_rounds: 5,
            learning_rate: 0.05,
            max_depth: 6,
            min_data_in_leaf: 5,
            seed: 1,
            mixed_max_iterations: 500,
            mixed_tolerance: 1e-6,
        }
    }
}

impl ForecastOptions {
    /// Create a new builder for forecast options.
    pub fn builder() -> ForecastOptionsBuilder {
        ForecastOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(OptionsError::InvalidMissingThreshold(self.missing_threshold));
        }
        if self.n_features == 0 {
            return Err(OptionsError::InvalidFeatureCount(self.n_features));
        }
        if self.cv_folds < 2 {
            return Err(OptionsError::InvalidFoldCount(self.cv_folds));
        }
        if self.max_boost_rounds == 0 {
            return Err(OptionsError::InvalidBoostRounds(self.max_boost_rounds));
        }
        if self.early_stopping_rounds == 0 {
            return Err(OptionsError::InvalidPatience(self.early_stopping_rounds));
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(OptionsError::InvalidLearningRate(self.learning_rate));
        }
        if self.max_depth == 0 {
            return Err(OptionsError::InvalidMaxDepth(self.max_depth));
        }
        if self.min_data_in_leaf == 0 {
            return Err(OptionsError::InvalidLeafSize(self.min_data_in_leaf));
        }
        if self.mixed_max_iterations == 0 {
            return Err(OptionsError::InvalidMaxIterations(self.mixed_max_iterations));
        }
        if self.mixed_tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.mixed_tolerance));
        }
        Ok(())
    }
}

/// Errors that can occur when validating forecast options.
///
/// This is the configuration-level failure taxonomy: nothing here is
/// retryable, and every variant indicates a caller mistake rather than a
/// data condition.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("missing-value threshold must be in [0, 1], got {0}")]
    InvalidMissingThreshold(f64),
    #[error("feature count must be at least 1, got {0}")]
    InvalidFeatureCount(usize),
    #[error("cross-validation needs at least 2 folds, got {0}")]
    InvalidFoldCount(usize),
    #[error("boosting round ceiling must be at least 1, got {0}")]
    InvalidBoostRounds(usize),
    #[error("early-stopping patience must be at least 1, got {0}")]
    InvalidPatience(usize),
    #[error("learning rate must be in (0, 1], got {0}")]
    InvalidLearningRate(f64),
    #[error("tree depth must be at least 1, got {0}")]
    InvalidMaxDepth(usize),
    #[error("leaf size must be at least 1, got {0}")]
    InvalidLeafSize(usize),
    #[error("max iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("cannot form {folds} folds from {observations} training pairs")]
    NotEnoughTrainingPairs { folds: usize, observations: usize },
}

/// Builder for `ForecastOptions`.
#[derive(Debug, Clone, Default)]
pub struct ForecastOptionsBuilder {
    options: ForecastOptions,
}

impl ForecastOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the missing-value threshold for covariate rejection.
    pub fn missing_threshold(mut self, threshold: f64) -> Self {
        self.options.missing_threshold = threshold;
        self
    }

    /// Set the number of covariates retained by feature selection.
    pub fn n_features(mut self, k: usize) -> Self {
        self.options.n_features = k;
        self
    }

    /// Set the number of cross-validation folds.
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.options.cv_folds = folds;
        self
    }

    /// Set the boosting round ceiling for cross-validation.
    pub fn max_boost_rounds(mut self, rounds: usize) -> Self {
        self.options.max_boost_rounds = rounds;
        self
    }

    /// Set the early-stopping patience in rounds.
    pub fn early_stopping_rounds(mut self, rounds: usize) -> Self {
        self.options.early_stopping_rounds = rounds;
        self
    }

    /// Set the boosting learning rate.
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.options.learning_rate = rate;
        self
    }

    /// Set the maximum tree depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    /// Set the minimum number of samples per leaf.
    pub fn min_data_in_leaf(mut self, size: usize) -> Self {
        self.options.min_data_in_leaf = size;
        self
    }

    /// Set the seed used for fold shuffling and mutual-information jitter.
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    /// Set the iteration cap for the mixed-model solver.
    pub fn mixed_max_iterations(mut self, max_iter: usize) -> Self {
        self.options.mixed_max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance for the mixed-model solver.
    pub fn mixed_tolerance(mut self, tol: f64) -> Self {
        self.options.mixed_tolerance = tol;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<ForecastOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> ForecastOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ForecastOptions::default();
        assert!((opts.missing_threshold - 0.3).abs() < 1e-12);
        assert_eq!(opts.n_features, 49);
        assert_eq!(opts.cv_folds, 3);
        assert_eq!(opts.max_boost_rounds, 300);
        assert_eq!(opts.early_stopping_rounds, 5);
        assert!((opts.learning_rate - 0.05).abs() < 1e-12);
        assert_eq!(opts.max_depth, 6);
        assert_eq!(opts.min_data_in_leaf, 5);
        assert_eq!(opts.seed, 1);
    }

    #[test]
    fn test_builder() {
        let opts = ForecastOptions::builder()
            .n_features(10)
            .cv_folds(5)
            .build()
            .unwrap();

        assert_eq!(opts.n_features, 10);
        assert_eq!(opts.cv_folds, 5);
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let result = ForecastOptions::builder().missing_threshold(1.5).build();
        assert!(matches!(
            result,
            Err(OptionsError::InvalidMissingThreshold(_))
        ));
    }

    #[test]
    fn test_validation_invalid_folds() {
        let result = ForecastOptions::builder().cv_folds(1).build();
        assert!(matches!(result, Err(OptionsError::InvalidFoldCount(_))));
    }

    #[test]
    fn test_validation_invalid_learning_rate() {
        let result = ForecastOptions::builder().learning_rate(0.0).build();
        assert!(matches!(result, Err(OptionsError::InvalidLearningRate(_))));
    }

    #[test]
    fn test_validation_invalid_patience() {
        let result = ForecastOptions::builder().early_stopping_rounds(0).build();
        assert!(matches!(result, Err(OptionsError::InvalidPatience(_))));
    }

    #[test]
    fn test_validation_invalid_feature_count() {
        let result = ForecastOptions::builder().n_features(0).build();
        assert!(matches!(result, Err(OptionsError::InvalidFeatureCount(_))));
    }
}
