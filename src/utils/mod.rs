//! Shared utility functions.

mod matrix;

pub use matrix::{missing_fraction, nan_mean, nan_std};
