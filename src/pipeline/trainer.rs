//! Training: temporal split, cross-validated round selection, final fit.

use std::collections::HashMap;

use faer::{Col, Mat};
use log::{debug, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::core::{
    ForecastOptions, ModelPrediction, OptionsError, Panel, SelectedFeatures, LAG_COLUMN,
    TIME_COLUMN,
};
use crate::data::DataError;
use crate::pipeline::groups::{GroupEncoder, GroupMap};
use crate::pipeline::PipelineError;
use crate::solvers::{FittedGroupedRegressor, FittedMixedBoost, GroupedRegressor, MixedBoostRegressor};

/// The aligned temporal training split.
///
/// Each entry pairs a feature row at year t with the target at year t+1 for
/// the same country: rows at the panel's last year never appear as feature
/// rows (no future label exists), rows at the first year never supply a
/// label, and a country-year with no successor row drops out entirely.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Feature matrix, one row per (country, year t) pair.
    pub x: Mat<f64>,
    /// Labels: the target at year t+1.
    pub y: Col<f64>,
    /// Dense group index per feature row.
    pub groups: Vec<usize>,
    /// The grouping the model will be trained with.
    pub group_map: GroupMap,
    /// Model feature columns, in matrix order.
    pub feature_columns: Vec<String>,
    /// Panel row index of each feature row.
    pub feature_rows: Vec<usize>,
}

/// Builds the training split and fits the forecasting model.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    options: ForecastOptions,
}

impl ModelTrainer {
    /// Create a trainer with the given options.
    pub fn new(options: ForecastOptions) -> Self {
        Self { options }
    }

    /// The model feature columns for a selection: the selected covariates
    /// followed by the structural columns (target, lag, time) when the
    /// screen did not already rank them. The year-t target value is the
    /// label's one-period lag, so it is always a feature.
    pub fn feature_columns(selected: &SelectedFeatures, target_column: &str) -> Vec<String> {
        let mut columns = selected.names();
        for structural in [target_column, LAG_COLUMN, TIME_COLUMN] {
            if !columns.iter().any(|c| c == structural) {
                columns.push(structural.to_string());
            }
        }
        columns
    }

    /// Assemble the aligned temporal split over `panel`.
    pub fn build_training_set(
        panel: &Panel,
        selected: &SelectedFeatures,
        target_column: &str,
    ) -> Result<TrainingSet, PipelineError> {
        let feature_columns = Self::feature_columns(selected, target_column);
        for name in &feature_columns {
            if !panel.has_column(name) {
                return Err(DataError::MissingColumn { name: name.clone() }.into());
            }
        }

        let target = panel
            .column(target_column)
            .ok_or_else(|| DataError::MissingColumn {
                name: target_column.to_string(),
            })?;

        // (country, year) -> row, to find each row's successor.
        let mut lookup: HashMap<(&str, i32), usize> = HashMap::new();
        for i in 0..panel.n_rows() {
            lookup.insert((panel.countries()[i].as_str(), panel.years()[i]), i);
        }

        let mut feature_rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..panel.n_rows() {
            let key = (panel.countries()[i].as_str(), panel.years()[i] + 1);
            if let Some(&successor) = lookup.get(&key) {
                feature_rows.push(i);
                labels.push(target[successor]);
            }
        }

        if feature_rows.is_empty() {
            return Err(DataError::EmptyPanel.into());
        }

        let split = panel.take_rows(&feature_rows);
        let x = split
            .matrix_of(&feature_columns)
            .ok_or_else(|| DataError::MissingColumn {
                name: feature_columns[0].clone(),
            })?;
        let (groups, group_map) = GroupEncoder::encode(&split);

        Ok(TrainingSet {
            x,
            y: Col::from_fn(labels.len(), |i| labels[i]),
            groups,
            group_map,
            feature_columns,
            feature_rows,
        })
    }

    /// Cross-validate the boosting round count, then fit the final model.
    pub fn train(
        &self,
        panel: &Panel,
        selected: &SelectedFeatures,
        target_column: &str,
    ) -> Result<TrainedForecastModel, PipelineError> {
        self.options.validate()?;
        let set = Self::build_training_set(panel, selected, target_column)?;

        info!(
            "training on {} pairs, {} features, {} countries",
            set.y.nrows(),
            set.feature_columns.len(),
            set.group_map.len()
        );

        let (n_rounds, cv_curve) = self.cross_validate(&set)?;
        info!("cross-validation selected {n_rounds} boosting rounds");

        let booster = MixedBoostRegressor::new(
            n_rounds,
            self.options.learning_rate,
            self.options.max_depth,
            self.options.min_data_in_leaf,
        );
        let fitted = booster.fit(&set.x, &set.y, &set.groups)?;

        Ok(TrainedForecastModel {
            fitted,
            group_map: set.group_map,
            feature_columns: set.feature_columns,
            target_column: target_column.to_string(),
            n_rounds,
            cv_curve,
        })
    }

    /// K-fold cross-validation over boosting rounds; returns the round count
    /// minimizing the mean validation squared error, with the mean curve.
    fn cross_validate(&self, set: &TrainingSet) -> Result<(usize, Vec<f64>), PipelineError> {
        let n = set.y.nrows();
        let k = self.options.cv_folds;
        if n < 2 * k {
            return Err(OptionsError::NotEnoughTrainingPairs {
                folds: k,
                observations: n,
            }
            .into());
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.options.seed);
        shuffle(&mut indices, &mut rng);

        let folds = build_folds(&indices, k);
        let n_groups = set.group_map.len();
        let booster = MixedBoostRegressor::new(
            self.options.max_boost_rounds,
            self.options.learning_rate,
            self.options.max_depth,
            self.options.min_data_in_leaf,
        );

        // Folds share no mutable state; score them in parallel.
        let curves: Vec<Vec<f64>> = folds
            .par_iter()
            .map(|fold| {
                let train_idx: Vec<usize> = indices
                    .iter()
                    .copied()
                    .filter(|i| !fold.contains(i))
                    .collect();

                let x_train = take_matrix_rows(&set.x, &train_idx);
                let y_train = Col::from_fn(train_idx.len(), |i| set.y[train_idx[i]]);
                let g_train: Vec<usize> = train_idx.iter().map(|&i| set.groups[i]).collect();

                let x_val = take_matrix_rows(&set.x, fold);
                let y_val = Col::from_fn(fold.len(), |i| set.y[fold[i]]);
                let g_val: Vec<usize> = fold.iter().map(|&i| set.groups[i]).collect();

                booster
                    .fit_with_validation(
                        &x_train,
                        &y_train,
                        &g_train,
                        &x_val,
                        &y_val,
                        &g_val,
                        n_groups,
                        self.options.early_stopping_rounds,
                    )
                    .map(|(_, curve)| curve)
            })
            .collect::<Result<_, _>>()?;

        // Average over the rounds every fold reached.
        let depth = curves.iter().map(Vec::len).min().unwrap_or(0);
        if depth == 0 {
            return Err(OptionsError::NotEnoughTrainingPairs {
                folds: k,
                observations: n,
            }
            .into());
        }
        let mean_curve: Vec<f64> = (0..depth)
            .map(|r| curves.iter().map(|c| c[r]).sum::<f64>() / curves.len() as f64)
            .collect();

        let best = mean_curve
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(r, _)| r + 1)
            .unwrap_or(1);

        debug!(
            "cv curve over {} rounds, best mean mse {:.6} at round {}",
            depth,
            mean_curve[best - 1],
            best
        );
        Ok((best, mean_curve))
    }
}

/// A trained forecasting model: the boosted ensemble, its random-effect
/// grouping, and the column recipe that reproduces its feature matrix.
#[derive(Debug, Clone)]
pub struct TrainedForecastModel {
    fitted: FittedMixedBoost,
    group_map: GroupMap,
    feature_columns: Vec<String>,
    target_column: String,
    n_rounds: usize,
    cv_curve: Vec<f64>,
}

impl TrainedForecastModel {
    /// Score one panel slice, aligning its countries through the training
    /// grouping.
    ///
    /// The slice's own encoding is derived first (bijective over the slice
    /// by construction); every country is then resolved against the training
    /// map, failing on unknowns rather than misattributing a random effect.
    pub fn predict_slice(&self, slice: &Panel) -> Result<ModelPrediction, PipelineError> {
        let (_, slice_map) = GroupEncoder::encode(slice);
        debug_assert_eq!(slice_map.len(), slice.distinct_countries().len());

        let groups = GroupEncoder::align(slice, &self.group_map)?;
        let x = slice
            .matrix_of(&self.feature_columns)
            .ok_or_else(|| DataError::MissingColumn {
                name: self
                    .feature_columns
                    .iter()
                    .find(|c| !slice.has_column(c))
                    .cloned()
                    .unwrap_or_default(),
            })?;

        Ok(self.fitted.predict(&x, &groups)?)
    }

    /// The boosting round count chosen by cross-validation.
    pub fn n_rounds(&self) -> usize {
        self.n_rounds
    }

    /// The mean validation error per round from cross-validation.
    pub fn cv_curve(&self) -> &[f64] {
        &self.cv_curve
    }

    /// The model's feature columns, in matrix order.
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// The target column this model forecasts.
    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// The training group map.
    pub fn group_map(&self) -> &GroupMap {
        &self.group_map
    }
}

/// Fisher-Yates shuffle.
fn shuffle(data: &mut [usize], rng: &mut Xoshiro256PlusPlus) {
    use rand::Rng;
    for i in (1..data.len()).rev() {
        let j = rng.gen_range(0..=i);
        data.swap(i, j);
    }
}

/// Split shuffled indices into `k` near-equal contiguous folds.
fn build_folds(indices: &[usize], k: usize) -> Vec<Vec<usize>> {
    let n = indices.len();
    let base = n / k;
    let extra = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for f in 0..k {
        let size = base + usize::from(f < extra);
        folds.push(indices[start..start + size].to_vec());
        start += size;
    }
    folds
}

/// Copy the given rows of a matrix.
fn take_matrix_rows(x: &Mat<f64>, rows: &[usize]) -> Mat<f64> {
    Mat::from_fn(rows.len(), x.ncols(), |i, j| x[(rows[i], j)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_folds_covers_everything() {
        let indices: Vec<usize> = (0..10).collect();
        let folds = build_folds(&indices, 3);
        assert_eq!(folds.len(), 3);
        assert_eq!(folds.iter().map(Vec::len).sum::<usize>(), 10);
        assert_eq!(folds[0].len(), 4);
    }

    #[test]
    fn test_shuffle_is_seed_stable() {
        let mut a: Vec<usize> = (0..20).collect();
        let mut b: Vec<usize> = (0..20).collect();
        shuffle(&mut a, &mut Xoshiro256PlusPlus::seed_from_u64(9));
        shuffle(&mut b, &mut Xoshiro256PlusPlus::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
