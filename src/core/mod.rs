//! Core types for panel forecasting.

mod options;
mod panel;
mod prediction;
mod selection;

pub use options::{ForecastOptions, ForecastOptionsBuilder, OptionsError};
pub use panel::{Panel, LAG_COLUMN, RESIDUAL_COLUMN, TIME_COLUMN};
pub use prediction::ModelPrediction;
pub use selection::{RankedFeature, SelectedFeatures};
