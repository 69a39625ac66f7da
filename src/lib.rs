//! A panel-forecasting library for country-level macroeconomic indicators.
//!
//! `panelcast` forecasts an annual indicator (by default GDP growth) from a
//! country-year panel. The pipeline reshapes long indicator records into a
//! wide panel with a one-period lag, residualizes the target on its lag with
//! a per-country random intercept, screens covariates by mutual information
//! against those residuals, trains gradient-boosted trees with a grouped
//! random effect (round count chosen by cross-validation), and extends the
//! panel recursively to forecast years beyond the observed horizon.
//!
//! # Example
//!
//! ```rust,ignore
//! use panelcast::prelude::*;
//!
//! let pipeline = Pipeline::new(ForecastOptions::default());
//! let cache = FileSelectionCache::new("selected_variables.csv");
//! let mut sink = MemorySink::new();
//!
//! // Forecast 2013 from a panel observed through 2010: the expander chains
//! // one-step predictions for 2011, 2012 and 2013.
//! let rows = pipeline.run(&source, &cache, 2013, &mut sink)?;
//! for row in &rows {
//!     println!("{} {} {:.2}", row.country, row.year, row.value);
//! }
//! ```

pub mod core;
pub mod data;
pub mod pipeline;
pub mod selection;
pub mod solvers;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        ForecastOptions, ForecastOptionsBuilder, ModelPrediction, OptionsError, Panel,
        RankedFeature, SelectedFeatures, LAG_COLUMN, RESIDUAL_COLUMN, TIME_COLUMN,
    };
    pub use crate::data::{
        column_name, default_excluded_regions, indicator_code, DataError, DataSource,
        MemorySource, PanelBuilder, DEFAULT_TARGET,
    };
    pub use crate::pipeline::{
        residualize, ForecastExpander, ForecastRow, GroupEncoder, GroupMap, MemorySink,
        ModelTrainer, Pipeline, PipelineError, RangeError, ResultSink, TrainedForecastModel,
    };
    pub use crate::selection::{
        FeatureSelector, FileSelectionCache, NoCache, SelectionCache,
    };
    pub use crate::solvers::{
        FittedGroupedRegressor, FittedMixedBoost, FittedMixedLm, GroupedRegressor,
        MixedBoostRegressor, MixedLmRegressor, ModelFitError,
    };
}

pub use crate::core::{ForecastOptions, Panel, SelectedFeatures};
pub use crate::pipeline::{ForecastRow, Pipeline, PipelineError};
