//! Linear mixed model with a per-group random intercept.
//!
//! Fits `y ~ X` with a random intercept per group by solving Henderson's
//! augmented normal equations, iterating the variance components with EM
//! until they stabilize. In this pipeline the solver's role is
//! residualization: the residuals of `target ~ lag1` (random intercept per
//! country) are the feature-selection response, decorrelated from the
//! autoregressive component so covariate importance reflects explanatory
//! power beyond persistence.

use faer::{Col, Mat};
use log::debug;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::core::ModelPrediction;
use crate::solvers::traits::{
    validate_groups, FittedGroupedRegressor, GroupedRegressor, ModelFitError,
};

/// Floor for the group variance so the shrinkage ratio stays finite when a
/// fit collapses to the no-group-effect boundary.
const GROUP_VARIANCE_FLOOR: f64 = 1e-12;

/// Random-intercept linear model estimator.
///
/// # Example
///
/// ```rust,ignore
/// use panelcast::solvers::{MixedLmRegressor, GroupedRegressor};
///
/// let fitted = MixedLmRegressor::default().fit(&x, &y, &groups)?;
/// println!("{}", fitted.summary());
/// let residuals = fitted.residuals();
/// ```
#[derive(Debug, Clone)]
pub struct MixedLmRegressor {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for MixedLmRegressor {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-6,
        }
    }
}

impl MixedLmRegressor {
    /// Create an estimator with the given variance-component iteration cap
    /// and relative convergence tolerance.
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }
}

/// A fitted random-intercept model.
#[derive(Debug, Clone)]
pub struct FittedMixedLm {
    intercept: f64,
    coefficients: Col<f64>,
    std_errors: Col<f64>,
    random_effects: Col<f64>,
    sigma2_residual: f64,
    sigma2_group: f64,
    residuals: Col<f64>,
    fitted_values: Col<f64>,
    n_obs: usize,
    n_groups: usize,
    iterations: usize,
}

impl GroupedRegressor for MixedLmRegressor {
    type Fitted = FittedMixedLm;

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        groups: &[usize],
    ) -> Result<Self::Fitted, ModelFitError> {
        let n = x.nrows();
        let p = x.ncols();

        if n != y.nrows() {
            return Err(ModelFitError::DimensionMismatch {
                x_rows: n,
                y_len: y.nrows(),
            });
        }
        let n_groups = validate_groups(n, groups)?;

        if n_groups < 2 {
            return Err(ModelFitError::DegenerateGroups { n_groups, n_obs: n });
        }
        // With ~one observation per group the group and residual variances
        // are not separable.
        if n <= n_groups + p + 1 {
            return Err(ModelFitError::DegenerateGroups { n_groups, n_obs: n });
        }

        let mut group_sizes = vec![0usize; n_groups];
        for &g in groups {
            group_sizes[g] += 1;
        }

        // Fixed design with a leading intercept column.
        let xf = Mat::from_fn(n, p + 1, |i, j| if j == 0 { 1.0 } else { x[(i, j - 1)] });

        // Sufficient statistics for the augmented system.
        let xtx = xf.transpose() * &xf;
        let xty = xf.transpose() * y;

        let mut xtz = Mat::zeros(p + 1, n_groups);
        let mut zty = Col::zeros(n_groups);
        for i in 0..n {
            let g = groups[i];
            zty[g] += y[i];
            for a in 0..p + 1 {
                xtz[(a, g)] += xf[(i, a)];
            }
        }

        // EM on the variance components; each step re-solves Henderson's
        // equations at the current shrinkage ratio.
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let y_var = y.iter().map(|&v| (v - y_mean) * (v - y_mean)).sum::<f64>() / n as f64;
        let mut sigma2_residual = (0.5 * y_var).max(GROUP_VARIANCE_FLOOR);
        let mut sigma2_group = (0.5 * y_var).max(GROUP_VARIANCE_FLOOR);

        let dim = p + 1 + n_groups;
        let mut converged_at = None;

        for iteration in 0..self.max_iterations {
            let ratio = sigma2_residual / sigma2_group;
            let system = assemble_henderson(&xtx, &xtz, &group_sizes, ratio);
            let mut rhs = Col::zeros(dim);
            for a in 0..p + 1 {
                rhs[a] = xty[a];
            }
            for g in 0..n_groups {
                rhs[p + 1 + g] = zty[g];
            }

            let solution = solve_symmetric(&system, &rhs)?;

            // Residuals at the current solution.
            let mut sse = 0.0;
            for i in 0..n {
                let mut fit = solution[p + 1 + groups[i]];
                for a in 0..p + 1 {
                    fit += xf[(i, a)] * solution[a];
                }
                let e = y[i] - fit;
                sse += e * e;
            }

            // E-step posterior variances, then the M-step updates.
            let mut sum_b2 = 0.0;
            let mut sum_v = 0.0;
            let mut sum_nv = 0.0;
            for g in 0..n_groups {
                let b = solution[p + 1 + g];
                let v = sigma2_residual / (group_sizes[g] as f64 + ratio);
                sum_b2 += b * b;
                sum_v += v;
                sum_nv += group_sizes[g] as f64 * v;
            }

            let new_sigma2_group = ((sum_b2 + sum_v) / n_groups as f64).max(GROUP_VARIANCE_FLOOR);
            let new_sigma2_residual = ((sse + sum_nv) / n as f64).max(GROUP_VARIANCE_FLOOR);

            let delta_group =
                (new_sigma2_group - sigma2_group).abs() / (sigma2_group + self.tolerance);
            let delta_residual = (new_sigma2_residual - sigma2_residual).abs()
                / (sigma2_residual + self.tolerance);

            sigma2_group = new_sigma2_group;
            sigma2_residual = new_sigma2_residual;

            if delta_group < self.tolerance && delta_residual < self.tolerance {
                converged_at = Some(iteration + 1);
                break;
            }
        }

        let iterations = match converged_at {
            Some(it) => it,
            None => {
                return Err(ModelFitError::ConvergenceFailed {
                    iterations: self.max_iterations,
                })
            }
        };
        debug!(
            "mixed model converged after {} iterations (sigma2_e={:.6}, sigma2_g={:.6})",
            iterations, sigma2_residual, sigma2_group
        );

        // Final pass at the converged variance components.
        let ratio = sigma2_residual / sigma2_group;
        let system = assemble_henderson(&xtx, &xtz, &group_sizes, ratio);
        let mut rhs = Col::zeros(dim);
        for a in 0..p + 1 {
            rhs[a] = xty[a];
        }
        for g in 0..n_groups {
            rhs[p + 1 + g] = zty[g];
        }
        let solution = solve_symmetric(&system, &rhs)?;

        let mut fitted_values = Col::zeros(n);
        let mut residuals = Col::zeros(n);
        for i in 0..n {
            let mut fit = solution[p + 1 + groups[i]];
            for a in 0..p + 1 {
                fit += xf[(i, a)] * solution[a];
            }
            fitted_values[i] = fit;
            residuals[i] = y[i] - fit;
        }

        // SE(beta_a) = sqrt(sigma2_e * [A^-1]_aa) over the fixed block.
        let mut std_errors = Col::zeros(p + 1);
        for a in 0..p + 1 {
            let mut unit = Col::zeros(dim);
            unit[a] = 1.0;
            let col = solve_symmetric(&system, &unit)?;
            let var = sigma2_residual * col[a];
            std_errors[a] = if var >= 0.0 { var.sqrt() } else { f64::NAN };
        }

        Ok(FittedMixedLm {
            intercept: solution[0],
            coefficients: Col::from_fn(p, |j| solution[j + 1]),
            std_errors,
            random_effects: Col::from_fn(n_groups, |g| solution[p + 1 + g]),
            sigma2_residual,
            sigma2_group,
            residuals,
            fitted_values,
            n_obs: n,
            n_groups,
            iterations,
        })
    }
}

impl FittedGroupedRegressor for FittedMixedLm {
    fn predict(&self, x: &Mat<f64>, groups: &[usize]) -> Result<ModelPrediction, ModelFitError> {
        let n = x.nrows();
        if x.ncols() != self.coefficients.nrows() {
            return Err(ModelFitError::DimensionMismatch {
                x_rows: x.ncols(),
                y_len: self.coefficients.nrows(),
            });
        }
        if groups.len() != n {
            return Err(ModelFitError::GroupingMismatch {
                x_rows: n,
                groups_len: groups.len(),
            });
        }
        if let Some(&bad) = groups.iter().find(|&&g| g >= self.n_groups) {
            return Err(ModelFitError::InvalidGrouping {
                index: bad,
                n_groups: self.n_groups,
            });
        }

        let fixed = Col::from_fn(n, |i| {
            let mut fit = self.intercept;
            for j in 0..self.coefficients.nrows() {
                fit += x[(i, j)] * self.coefficients[j];
            }
            fit
        });
        let random_mean = Col::from_fn(n, |i| self.random_effects[groups[i]]);
        Ok(ModelPrediction::new(fixed, random_mean))
    }

    fn n_groups(&self) -> usize {
        self.n_groups
    }
}

impl FittedMixedLm {
    /// The fixed intercept.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Fixed-effect slope coefficients (excluding the intercept).
    pub fn coefficients(&self) -> &Col<f64> {
        &self.coefficients
    }

    /// Best linear unbiased predictions of the group intercepts.
    pub fn random_effects(&self) -> &Col<f64> {
        &self.random_effects
    }

    /// Row-aligned residuals `y - fitted`.
    pub fn residuals(&self) -> &Col<f64> {
        &self.residuals
    }

    /// Fitted values on the training rows.
    pub fn fitted_values(&self) -> &Col<f64> {
        &self.fitted_values
    }

    /// Residual variance component.
    pub fn sigma2_residual(&self) -> f64 {
        self.sigma2_residual
    }

    /// Group (random-intercept) variance component.
    pub fn sigma2_group(&self) -> f64 {
        self.sigma2_group
    }

    /// Number of variance-component iterations until convergence.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// A plain-text fit report: coefficients with standard errors,
    /// z-statistics and normal p-values, plus the variance components.
    pub fn summary(&self) -> String {
        let normal = Normal::new(0.0, 1.0).ok();
        let mut out = String::new();
        out.push_str("Mixed linear model (random intercept)\n");
        out.push_str(&format!(
            "observations: {}   groups: {}   iterations: {}\n",
            self.n_obs, self.n_groups, self.iterations
        ));
        out.push_str(&format!(
            "{:<12} {:>12} {:>12} {:>9} {:>9}\n",
            "term", "coef", "std err", "z", "P>|z|"
        ));

        let p = self.coefficients.nrows();
        for a in 0..p + 1 {
            let (name, coef) = if a == 0 {
                ("Intercept".to_string(), self.intercept)
            } else {
                (format!("x{a}"), self.coefficients[a - 1])
            };
            let se = self.std_errors[a];
            let z = coef / se;
            let p_value = normal
                .as_ref()
                .map_or(f64::NAN, |d| 2.0 * (1.0 - d.cdf(z.abs())));
            out.push_str(&format!(
                "{name:<12} {coef:>12.6} {se:>12.6} {z:>9.3} {p_value:>9.3}\n"
            ));
        }
        out.push_str(&format!(
            "group var    {:>12.6}\nresidual var {:>12.6}\n",
            self.sigma2_group, self.sigma2_residual
        ));
        out
    }
}

/// Assemble Henderson's augmented coefficient matrix
/// `[[X'X, X'Z], [Z'X, Z'Z + ratio * I]]`.
fn assemble_henderson(
    xtx: &Mat<f64>,
    xtz: &Mat<f64>,
    group_sizes: &[usize],
    ratio: f64,
) -> Mat<f64> {
    let pf = xtx.nrows();
    let n_groups = group_sizes.len();
    let dim = pf + n_groups;

    Mat::from_fn(dim, dim, |r, c| {
        if r < pf && c < pf {
            xtx[(r, c)]
        } else if r < pf {
            xtz[(r, c - pf)]
        } else if c < pf {
            xtz[(c, r - pf)]
        } else if r == c {
            group_sizes[r - pf] as f64 + ratio
        } else {
            0.0
        }
    })
}

/// Solve `A x = b` for a symmetric positive-definite system via QR with
/// back-substitution.
fn solve_symmetric(a: &Mat<f64>, b: &Col<f64>) -> Result<Col<f64>, ModelFitError> {
    let dim = a.nrows();
    let qr = a.qr();
    let q = qr.compute_Q();
    let r = qr.R();

    for i in 0..dim {
        if r[(i, i)].abs() < 1e-12 {
            return Err(ModelFitError::SingularMatrix);
        }
    }

    let qtb = q.transpose() * b;
    let mut x = Col::zeros(dim);
    for i in (0..dim).rev() {
        let mut sum = qtb[i];
        for j in (i + 1)..dim {
            sum -= r[(i, j)] * x[j];
        }
        x[i] = sum / r[(i, i)];
    }
    Ok(x)
}
