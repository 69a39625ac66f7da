//! Recursive multi-step forecasting.
//!
//! For a requested year inside the observed horizon the expander slices the
//! panel at the lag year and predicts once. Beyond the horizon it chains
//! one-step predictions: each step's output overwrites the target column of
//! the previous slice, the old target becomes the new lag, the slice is
//! re-labeled as the next year, group indices are re-derived, and the model
//! scores again. The chain is strictly sequential; a failed step aborts the
//! whole expansion because every later step depends on it.

use faer::Col;
use log::{debug, info};
use thiserror::Error;

use crate::core::{Panel, LAG_COLUMN};
use crate::data::DataError;
use crate::pipeline::trainer::TrainedForecastModel;
use crate::pipeline::{ForecastRow, PipelineError};

/// The requested year precedes the earliest forecastable year
/// (no lag year would exist for it).
#[derive(Debug, Error)]
#[error("requested year {requested} is below the minimum forecastable year {minimum}")]
pub struct RangeError {
    /// The year asked for.
    pub requested: i32,
    /// The earliest admissible year.
    pub minimum: i32,
}

/// Produces forecasts for an arbitrary target year from a trained model and
/// the panel it was trained on.
#[derive(Debug, Clone, Copy)]
pub struct ForecastExpander<'a> {
    model: &'a TrainedForecastModel,
}

impl<'a> ForecastExpander<'a> {
    /// Create an expander over a trained model.
    pub fn new(model: &'a TrainedForecastModel) -> Self {
        Self { model }
    }

    /// Forecast the requested year, returning one row per country.
    pub fn forecast(&self, panel: &Panel, year: i32) -> Result<Vec<ForecastRow>, PipelineError> {
        let mut chain = self.forecast_chain(panel, year)?;
        // The last link is the requested year.
        Ok(chain.pop().unwrap_or_default())
    }

    /// Forecast the requested year together with every intermediate
    /// synthesized year.
    ///
    /// Direct-mode requests return a single link. Recursive-mode requests
    /// return one link per chained year, `year_max + 1 ..= year`; the first
    /// link is identical to what a direct request for `year_max + 1` yields.
    pub fn forecast_chain(
        &self,
        panel: &Panel,
        year: i32,
    ) -> Result<Vec<Vec<ForecastRow>>, PipelineError> {
        // The panel's first retained year sits one past the earliest source
        // year (the leading source year only ever supplies lag information),
        // so the earliest forecastable year is the panel minimum itself.
        let panel_min = panel.year_min().ok_or(DataError::EmptyPanel)?;
        let year_max = panel.year_max().ok_or(DataError::EmptyPanel)?;

        if year < panel_min {
            return Err(RangeError {
                requested: year,
                minimum: panel_min,
            }
            .into());
        }

        if year <= year_max + 1 {
            // Direct mode: slice the lag year. A year with no surviving lag
            // rows forecasts nothing rather than failing.
            info!("direct forecast for {year} from the {} slice", year - 1);
            let slice = panel.rows_at_year(year - 1);
            if slice.is_empty() {
                return Ok(vec![Vec::new()]);
            }
            let (rows, _) = self.predict_step(&slice)?;
            return Ok(vec![rows]);
        }

        // Recursive mode: chain one-step predictions from the first
        // unobserved year up to the requested one.
        info!(
            "recursive forecast for {year}: expanding {} steps beyond {year_max}",
            year - year_max - 1
        );
        let mut slice = panel.rows_at_year(year_max);
        let mut chain = Vec::with_capacity((year - year_max) as usize);
        let mut predicted_year = year_max + 1;
        loop {
            let (rows, predictions) = self.predict_step(&slice)?;
            chain.push(rows);
            if predicted_year == year {
                break;
            }
            slice = advance_slice(&slice, self.model.target_column(), &predictions);
            predicted_year += 1;
        }
        Ok(chain)
    }

    /// Score one slice, returning forecast rows for the following year.
    fn predict_step(&self, slice: &Panel) -> Result<(Vec<ForecastRow>, Col<f64>), PipelineError> {
        let prediction = self.model.predict_slice(slice)?;
        let point = prediction.point();

        let rows = (0..slice.n_rows())
            .map(|i| ForecastRow {
                country: slice.countries()[i].clone(),
                year: slice.years()[i] + 1,
                value: point[i],
            })
            .collect();
        debug!(
            "predicted {} countries for year {}",
            slice.n_rows(),
            slice.years().first().map_or(0, |y| y + 1)
        );
        Ok((rows, point))
    }
}

/// Rewrite a slice as the following year's synthetic data: the old target
/// becomes the lag, the fresh prediction becomes the target, and the year
/// and `Time` advance by one.
fn advance_slice(slice: &Panel, target_column: &str, predictions: &Col<f64>) -> Panel {
    let old_target = slice
        .column(target_column)
        .unwrap_or_else(|| vec![f64::NAN; slice.n_rows()]);
    let lag = Col::from_fn(slice.n_rows(), |i| old_target[i]);

    slice
        .with_column(LAG_COLUMN, &lag)
        .with_column(target_column, predictions)
        .advance_year()
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;
    use crate::core::TIME_COLUMN;

    fn slice_panel() -> Panel {
        let countries = vec!["AAA".into(), "BBB".into()];
        let years = vec![2010, 2010];
        let names = vec![
            "tgt".to_string(),
            LAG_COLUMN.to_string(),
            TIME_COLUMN.to_string(),
        ];
        let mut values = Mat::zeros(2, 3);
        values[(0, 0)] = 1.5;
        values[(1, 0)] = -0.5;
        values[(0, 1)] = 1.0;
        values[(1, 1)] = -1.0;
        values[(0, 2)] = 2010.0;
        values[(1, 2)] = 2010.0;
        Panel::new(countries, years, names, values)
    }

    #[test]
    fn test_advance_slice_rederives_lag_from_target() {
        let slice = slice_panel();
        let predictions = Col::from_fn(2, |i| 10.0 + i as f64);

        let next = advance_slice(&slice, "tgt", &predictions);

        // old target -> new lag
        assert!((next.value(0, LAG_COLUMN).unwrap() - 1.5).abs() < 1e-12);
        assert!((next.value(1, LAG_COLUMN).unwrap() + 0.5).abs() < 1e-12);
        // prediction -> new target
        assert!((next.value(0, "tgt").unwrap() - 10.0).abs() < 1e-12);
        assert!((next.value(1, "tgt").unwrap() - 11.0).abs() < 1e-12);
        // year and Time advance together
        assert_eq!(next.years(), &[2011, 2011]);
        assert!((next.value(0, TIME_COLUMN).unwrap() - 2011.0).abs() < 1e-12);
    }
}
