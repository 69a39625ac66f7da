//! Mutual-information estimation between a covariate and a continuous
//! response.
//!
//! Plug-in estimator over an equal-frequency discretization of both
//! variables. Continuous covariates are jittered with a seeded RNG before
//! ranking so that ties (common in sparsely varying indicators) break the
//! same way on every run; with a fixed seed the estimate is fully
//! deterministic.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::utils::nan_std;

/// Relative magnitude of the tie-breaking jitter.
const JITTER_SCALE: f64 = 1e-10;

/// Estimate the mutual information (in nats) between `x` and `y`.
///
/// Both slices must be fully observed and of equal length. Returns 0.0 for
/// degenerate inputs (fewer than two observations or a constant slice).
pub fn mutual_information(
    x: &[f64],
    y: &[f64],
    n_bins: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> f64 {
    let n = x.len();
    if n < 2 || y.len() != n || n_bins < 2 {
        return 0.0;
    }

    let spread = nan_std(x);
    if spread.is_nan() {
        return 0.0;
    }
    let jitter = JITTER_SCALE * if spread > 0.0 { spread } else { 1.0 };
    let jittered: Vec<f64> = x.iter().map(|&v| v + jitter * rng.gen::<f64>()).collect();

    let x_bins = equal_frequency_bins(&jittered, n_bins);
    let y_bins = equal_frequency_bins(y, n_bins);

    let mut joint = vec![0usize; n_bins * n_bins];
    let mut marginal_x = vec![0usize; n_bins];
    let mut marginal_y = vec![0usize; n_bins];
    for i in 0..n {
        joint[x_bins[i] * n_bins + y_bins[i]] += 1;
        marginal_x[x_bins[i]] += 1;
        marginal_y[y_bins[i]] += 1;
    }

    let total = n as f64;
    let mut mi = 0.0;
    for bx in 0..n_bins {
        for by in 0..n_bins {
            let c = joint[bx * n_bins + by];
            if c == 0 {
                continue;
            }
            let p_xy = c as f64 / total;
            let p_x = marginal_x[bx] as f64 / total;
            let p_y = marginal_y[by] as f64 / total;
            mi += p_xy * (p_xy / (p_x * p_y)).ln();
        }
    }
    mi.max(0.0)
}

/// Assign each value to one of `n_bins` equal-frequency bins by rank.
/// Ties resolve by original index, which keeps the assignment stable.
fn equal_frequency_bins(values: &[f64], n_bins: usize) -> Vec<usize> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut bins = vec![0usize; n];
    for (rank, &i) in order.iter().enumerate() {
        bins[i] = (rank * n_bins / n).min(n_bins - 1);
    }
    bins
}

/// Bin count heuristic for `n` observations: `sqrt(n)` clamped to `[2, 32]`.
pub fn default_bins(n: usize) -> usize {
    ((n as f64).sqrt().floor() as usize).clamp(2, 32)
}
