//! Grouped estimators: the mixed linear model used for residualization and
//! the boosted-tree model used for forecasting.

mod boost;
mod mixed_lm;
mod traits;
mod tree;

pub use boost::{FittedMixedBoost, MixedBoostRegressor};
pub use mixed_lm::{FittedMixedLm, MixedLmRegressor};
pub use traits::{FittedGroupedRegressor, GroupedRegressor, ModelFitError};
