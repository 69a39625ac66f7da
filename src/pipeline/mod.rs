//! The forecasting pipeline: residualize, select, train, expand, persist.

mod forecast;
mod groups;
mod trainer;

pub use forecast::{ForecastExpander, RangeError};
pub use groups::{GroupEncoder, GroupMap};
pub use trainer::{ModelTrainer, TrainedForecastModel, TrainingSet};

use faer::Mat;
use log::{debug, info};
use thiserror::Error;

use crate::core::{ForecastOptions, OptionsError, Panel, SelectedFeatures, LAG_COLUMN, RESIDUAL_COLUMN};
use crate::data::{
    column_name, default_excluded_regions, DataError, DataSource, PanelBuilder, DEFAULT_TARGET,
};
use crate::selection::{FeatureSelector, SelectionCache};
use crate::solvers::{GroupedRegressor, MixedLmRegressor, ModelFitError};

/// Any failure the pipeline can surface. Nothing here is retried: every
/// variant is a data or configuration problem that a retry cannot fix, so
/// errors propagate to the caller, which reports and halts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Fit(#[from] ModelFitError),

    #[error(transparent)]
    Config(#[from] OptionsError),

    #[error(transparent)]
    Range(#[from] RangeError),
}

/// One emitted forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub country: String,
    pub year: i32,
    pub value: f64,
}

/// Destination for forecast rows. `replace` overwrites any prior content so
/// re-runs are idempotent.
pub trait ResultSink {
    /// Replace the sink's content with these rows.
    fn replace(&mut self, rows: &[ForecastRow]) -> Result<(), DataError>;
}

/// A sink that keeps the rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Vec<ForecastRow>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The rows from the most recent run.
    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }
}

impl ResultSink for MemorySink {
    fn replace(&mut self, rows: &[ForecastRow]) -> Result<(), DataError> {
        self.rows = rows.to_vec();
        Ok(())
    }
}

/// Fit `target ~ lag1` with a random intercept per country and return a new
/// panel carrying the row-aligned residuals.
///
/// The residuals are the feature-selection response: decorrelated from the
/// autoregressive component, so covariate importance reflects explanatory
/// power beyond persistence. Solver non-convergence propagates; it signals a
/// data problem (typically degenerate country groups), not a transient
/// failure.
pub fn residualize(
    panel: &Panel,
    target_column: &str,
    options: &ForecastOptions,
) -> Result<Panel, PipelineError> {
    let target = panel
        .column(target_column)
        .ok_or_else(|| DataError::MissingColumn {
            name: target_column.to_string(),
        })?;
    let lag = panel
        .column(LAG_COLUMN)
        .ok_or_else(|| DataError::MissingColumn {
            name: LAG_COLUMN.to_string(),
        })?;

    let x = Mat::from_fn(panel.n_rows(), 1, |i, _| lag[i]);
    let y = faer::Col::from_fn(panel.n_rows(), |i| target[i]);
    let (groups, _) = GroupEncoder::encode(panel);

    info!("residualizing {} on its lag over {} rows", target_column, panel.n_rows());
    let fitted = MixedLmRegressor::new(options.mixed_max_iterations, options.mixed_tolerance)
        .fit(&x, &y, &groups)?;
    debug!("\n{}", fitted.summary());

    Ok(panel.with_column(RESIDUAL_COLUMN, fitted.residuals()))
}

/// End-to-end orchestration: panel assembly, residualization, cache-aware
/// covariate selection, training, expansion, and persistence.
///
/// # Example
///
/// ```rust,ignore
/// use panelcast::pipeline::{Pipeline, MemorySink};
/// use panelcast::selection::FileSelectionCache;
///
/// let pipeline = Pipeline::new(ForecastOptions::default());
/// let cache = FileSelectionCache::new("selected_variables.csv");
/// let mut sink = MemorySink::new();
/// let rows = pipeline.run(&source, &cache, 2013, &mut sink)?;
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    options: ForecastOptions,
    target: String,
    excluded_regions: Vec<String>,
}

impl Pipeline {
    /// Create a pipeline forecasting the default indicator (GDP growth)
    /// with the default region exclusions.
    pub fn new(options: ForecastOptions) -> Self {
        Self {
            options,
            target: DEFAULT_TARGET.to_string(),
            excluded_regions: default_excluded_regions(),
        }
    }

    /// Override the target indicator (storage notation).
    pub fn target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Override the excluded region list.
    pub fn excluded_regions(mut self, regions: Vec<String>) -> Self {
        self.excluded_regions = regions;
        self
    }

    /// Run the full pipeline and forecast the requested year.
    ///
    /// The selection cache is consulted before screening; a cold cache
    /// triggers a full recomputation and a fresh write. Results replace the
    /// sink's prior content.
    pub fn run(
        &self,
        source: &dyn DataSource,
        cache: &dyn SelectionCache,
        year: i32,
        sink: &mut dyn ResultSink,
    ) -> Result<Vec<ForecastRow>, PipelineError> {
        self.options.validate()?;
        let target_column = column_name(&self.target);

        let panel = PanelBuilder::new(&self.target)
            .exclude_regions(self.excluded_regions.clone())
            .build(source)?;

        let selected = self.select_features(&panel, &target_column, cache)?;

        let trainer = ModelTrainer::new(self.options.clone());
        let model = trainer.train(&panel, &selected, &target_column)?;

        let expander = ForecastExpander::new(&model);
        let rows = expander.forecast(&panel, year)?;

        sink.replace(&rows)?;
        info!("forecast complete: {} rows for year {year}", rows.len());
        Ok(rows)
    }

    /// Selection with cache short-circuit: a warm cache is reused verbatim.
    fn select_features(
        &self,
        panel: &Panel,
        target_column: &str,
        cache: &dyn SelectionCache,
    ) -> Result<SelectedFeatures, PipelineError> {
        if let Some(cached) = cache.load()? {
            return Ok(cached);
        }

        let residualized = residualize(panel, target_column, &self.options)?;
        let selected =
            FeatureSelector::from_options(&self.options).select(&residualized, target_column)?;
        cache.store(&selected)?;
        Ok(selected)
    }
}
