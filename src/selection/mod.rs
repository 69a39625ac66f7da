//! Covariate screening against the residualized target.
//!
//! The selector never feeds its imputed working copy to the model: its
//! output is a ranked list naming which raw panel columns the model will
//! use. Imputation exists only to make the mutual-information estimate
//! well-defined on gappy columns.

mod cache;
mod mi;

pub use cache::{FileSelectionCache, NoCache, SelectionCache};
pub use mi::{default_bins, mutual_information};

use std::collections::HashMap;

use log::info;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::{
    ForecastOptions, Panel, RankedFeature, SelectedFeatures, RESIDUAL_COLUMN,
};
use crate::data::DataError;
use crate::utils::{missing_fraction, nan_mean};

/// Ranks covariates by mutual information against the residual response and
/// keeps the top K.
///
/// Contract, in order: (1) drop columns whose missing fraction exceeds the
/// threshold; (2) within each country, forward-fill then back-fill gaps;
/// (3) fill what remains with the column's global mean; (4) score each
/// survivor by mutual information against the residual; (5) rank descending
/// with stable ties and keep the top K. The target and residual columns are
/// never candidates.
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    missing_threshold: f64,
    top_k: usize,
    seed: u64,
}

impl FeatureSelector {
    /// Create a selector from pipeline options.
    pub fn from_options(options: &ForecastOptions) -> Self {
        Self {
            missing_threshold: options.missing_threshold,
            top_k: options.n_features,
            seed: options.seed,
        }
    }

    /// Create a selector with explicit parameters.
    pub fn new(missing_threshold: f64, top_k: usize, seed: u64) -> Self {
        Self {
            missing_threshold,
            top_k,
            seed,
        }
    }

    /// Run the screen over a residualized panel.
    ///
    /// The panel must carry the `residuals` column; `target_column` names the
    /// indicator being forecast (excluded from the candidate pool).
    pub fn select(
        &self,
        panel: &Panel,
        target_column: &str,
    ) -> Result<SelectedFeatures, DataError> {
        let residual = panel
            .column(RESIDUAL_COLUMN)
            .ok_or_else(|| DataError::MissingColumn {
                name: RESIDUAL_COLUMN.to_string(),
            })?;

        let candidates: Vec<String> = panel
            .names()
            .iter()
            .filter(|name| name.as_str() != target_column && name.as_str() != RESIDUAL_COLUMN)
            .cloned()
            .collect();

        // (1) Missing-fraction screen.
        let n_rows = panel.n_rows();
        let kept: Vec<String> = candidates
            .into_iter()
            .filter(|name| match panel.col_index(name) {
                Some(j) => missing_fraction(panel.values(), j) <= self.missing_threshold,
                None => false,
            })
            .collect();
        info!(
            "feature screen: {} candidates within missing threshold {}",
            kept.len(),
            self.missing_threshold
        );

        // Row indices per country, ordered by year, for the temporal fill.
        let country_rows = rows_by_country(panel);

        // (4) Mutual information per candidate, in column order, one RNG
        // stream for the whole pass so results are seed-reproducible.
        let n_bins = default_bins(n_rows);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let mut ranked: Vec<RankedFeature> = Vec::with_capacity(kept.len());
        for name in &kept {
            let column = panel.column(name).unwrap_or_default();
            let filled = impute_column(&column, &country_rows);
            let importance = mutual_information(&filled, &residual, n_bins, &mut rng);
            ranked.push(RankedFeature {
                name: name.clone(),
                importance,
            });
        }

        // (5) Stable descending sort preserves column order on ties.
        ranked.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.top_k);

        info!(
            "feature screen: retained top {} of {} candidates",
            ranked.len(),
            kept.len()
        );
        Ok(SelectedFeatures::new(ranked))
    }
}

/// Row indices grouped by country, each group sorted by year.
fn rows_by_country(panel: &Panel) -> Vec<Vec<usize>> {
    let mut by_country: HashMap<&str, Vec<usize>> = HashMap::new();
    for i in 0..panel.n_rows() {
        by_country
            .entry(panel.countries()[i].as_str())
            .or_default()
            .push(i);
    }

    let mut groups: Vec<Vec<usize>> = by_country.into_values().collect();
    for rows in &mut groups {
        rows.sort_by_key(|&i| panel.years()[i]);
    }
    // Deterministic group order (the fill itself is order-independent, but
    // keep iteration reproducible anyway).
    groups.sort_by_key(|rows| rows[0]);
    groups
}

/// (2) Per-country forward/backward fill, then (3) global mean fill.
fn impute_column(column: &[f64], country_rows: &[Vec<usize>]) -> Vec<f64> {
    let mut filled = column.to_vec();

    for rows in country_rows {
        let mut last = f64::NAN;
        for &i in rows {
            if filled[i].is_nan() {
                filled[i] = last;
            } else {
                last = filled[i];
            }
        }
        let mut next = f64::NAN;
        for &i in rows.iter().rev() {
            if filled[i].is_nan() {
                filled[i] = next;
            } else {
                next = filled[i];
            }
        }
    }

    let global_mean = nan_mean(column);
    for v in &mut filled {
        if v.is_nan() {
            // A column that is entirely missing stays at 0; the screen will
            // score it as uninformative.
            *v = if global_mean.is_nan() { 0.0 } else { global_mean };
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    /// Panel with one informative covariate, one noise covariate, and one
    /// mostly-missing covariate.
    fn panel_with_residuals() -> Panel {
        let n = 60;
        let countries: Vec<String> = (0..n).map(|i| format!("C{:02}", i / 10)).collect();
        let years: Vec<i32> = (0..n).map(|i| 2000 + (i % 10) as i32).collect();
        let names = vec![
            "target".to_string(),
            "informative".to_string(),
            "noise".to_string(),
            "gappy".to_string(),
            RESIDUAL_COLUMN.to_string(),
        ];
        let values = Mat::from_fn(n, 5, |i, j| {
            let resid = ((i * 13 + 5) % 17) as f64;
            match j {
                0 => i as f64,
                1 => resid * 2.0 + 1.0,
                2 => ((i * 31 + 7) % 23) as f64,
                3 => f64::NAN,
                _ => resid,
            }
        });
        Panel::new(countries, years, names, values)
    }

    #[test]
    fn test_target_and_residual_excluded() {
        let panel = panel_with_residuals();
        let selected = FeatureSelector::new(0.3, 10, 1)
            .select(&panel, "target")
            .unwrap();
        assert!(!selected.contains("target"));
        assert!(!selected.contains(RESIDUAL_COLUMN));
    }

    #[test]
    fn test_gappy_column_dropped() {
        let panel = panel_with_residuals();
        let selected = FeatureSelector::new(0.3, 10, 1)
            .select(&panel, "target")
            .unwrap();
        assert!(!selected.contains("gappy"));
    }

    #[test]
    fn test_informative_ranks_first() {
        let panel = panel_with_residuals();
        let selected = FeatureSelector::new(0.3, 10, 1)
            .select(&panel, "target")
            .unwrap();
        assert_eq!(selected.features()[0].name, "informative");
    }

    #[test]
    fn test_top_k_bound() {
        let panel = panel_with_residuals();
        let selected = FeatureSelector::new(0.3, 1, 1)
            .select(&panel, "target")
            .unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let panel = panel_with_residuals();
        let selector = FeatureSelector::new(0.3, 10, 7);
        let a = selector.select(&panel, "target").unwrap();
        let b = selector.select(&panel, "target").unwrap();
        assert_eq!(a.names(), b.names());
        for (fa, fb) in a.features().iter().zip(b.features()) {
            assert_eq!(fa.importance.to_bits(), fb.importance.to_bits());
        }
    }

    #[test]
    fn test_missing_residual_column_fails() {
        let panel = Panel::new(
            vec!["AAA".into()],
            vec![2000],
            vec!["target".to_string()],
            Mat::zeros(1, 1),
        );
        let result = FeatureSelector::new(0.3, 5, 1).select(&panel, "target");
        assert!(matches!(result, Err(DataError::MissingColumn { .. })));
    }

    #[test]
    fn test_impute_column_fills_within_country() {
        let column = vec![1.0, f64::NAN, 3.0, f64::NAN, 5.0, 6.0];
        let groups = vec![vec![0, 1, 2], vec![3, 4, 5]];
        let filled = impute_column(&column, &groups);
        // forward fill inside the first country
        assert!((filled[1] - 1.0).abs() < 1e-12);
        // back fill at the start of the second country
        assert!((filled[3] - 5.0).abs() < 1e-12);
    }
}
