//! Matrix and column utility functions.
//!
//! Panels are sparse: absent (country, year, indicator) observations are
//! stored as `f64::NAN`. The helpers here are the NaN-aware building blocks
//! used by feature selection and imputation.

use faer::Mat;

/// Fraction of missing (NaN) entries in column `j` of `x`.
pub fn missing_fraction(x: &Mat<f64>, j: usize) -> f64 {
    let n_rows = x.nrows();
    if n_rows == 0 {
        return 1.0;
    }

    let missing = (0..n_rows).filter(|&i| x[(i, j)].is_nan()).count();
    missing as f64 / n_rows as f64
}

/// Mean of the non-missing entries in a slice, or NaN if all are missing.
pub fn nan_mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;

    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }

    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation of the non-missing entries, or NaN if all
/// are missing.
pub fn nan_std(values: &[f64]) -> f64 {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return f64::NAN;
    }

    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for &v in values {
        if !v.is_nan() {
            sum_sq += (v - mean) * (v - mean);
            count += 1;
        }
    }

    (sum_sq / count as f64).sqrt()
}
