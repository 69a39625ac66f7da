//! The wide country-year panel.
//!
//! A [`Panel`] is an immutable table with one row per (country, year) and one
//! numeric column per indicator, plus the derived `Time` and `lag1` columns.
//! Missing observations are `f64::NAN`. Every transformation returns a new
//! `Panel`; pipeline stages never observe another stage's intermediate
//! mutation.

use std::collections::HashMap;

use faer::{Col, Mat};

/// Column name of the denormalized year copy.
pub const TIME_COLUMN: &str = "Time";

/// Column name of the one-period lag of the target indicator.
pub const LAG_COLUMN: &str = "lag1";

/// Column name of the residuals appended by the residualization stage.
pub const RESIDUAL_COLUMN: &str = "residuals";

/// An immutable wide panel indexed by (country, year).
///
/// Rows are keyed by the parallel `countries`/`years` vectors; the numeric
/// block holds one column per named indicator. The country key is carried as
/// row metadata rather than a numeric column, so the feature matrix handed to
/// a model is purely numeric by construction.
#[derive(Debug, Clone)]
pub struct Panel {
    countries: Vec<String>,
    years: Vec<i32>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Mat<f64>,
}

impl Panel {
    /// Assemble a panel from row keys, column names and a value matrix.
    ///
    /// # Panics
    /// Panics if `countries`, `years` and `values` row counts disagree, or if
    /// `names` does not match the column count. Construction happens in a
    /// handful of audited places; a mismatch is a logic error, not a data
    /// condition.
    pub fn new(countries: Vec<String>, years: Vec<i32>, names: Vec<String>, values: Mat<f64>) -> Self {
        assert_eq!(countries.len(), values.nrows(), "row key / matrix mismatch");
        assert_eq!(years.len(), values.nrows(), "year key / matrix mismatch");
        assert_eq!(names.len(), values.ncols(), "column name / matrix mismatch");

        let index = names
            .iter()
            .enumerate()
            .map(|(j, name)| (name.clone(), j))
            .collect();

        Self {
            countries,
            years,
            names,
            index,
            values,
        }
    }

    /// Number of rows (country-year observations).
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of numeric columns.
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// True if the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Column names in storage order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Per-row country codes.
    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    /// Per-row years.
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// The numeric value block.
    pub fn values(&self) -> &Mat<f64> {
        &self.values
    }

    /// Index of a named column, if present.
    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// True if the panel has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Value at (row, named column); None if the column is absent.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.col_index(name).map(|j| self.values[(row, j)])
    }

    /// A named column copied into an owned vector; None if absent.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.col_index(name)?;
        Some((0..self.n_rows()).map(|i| self.values[(i, j)]).collect())
    }

    /// Smallest year present, if any row exists.
    pub fn year_min(&self) -> Option<i32> {
        self.years.iter().copied().min()
    }

    /// Largest year present, if any row exists.
    pub fn year_max(&self) -> Option<i32> {
        self.years.iter().copied().max()
    }

    /// Distinct country codes in first-appearance row order.
    pub fn distinct_countries(&self) -> Vec<String> {
        let mut seen = HashMap::new();
        let mut out = Vec::new();
        for code in &self.countries {
            if seen.insert(code.clone(), ()).is_none() {
                out.push(code.clone());
            }
        }
        out
    }

    /// New panel containing only the rows at the given year.
    pub fn rows_at_year(&self, year: i32) -> Panel {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| self.years[i] == year)
            .collect();
        self.take_rows(&keep)
    }

    /// New panel containing only the rows whose index is in `rows`, in order.
    pub fn take_rows(&self, rows: &[usize]) -> Panel {
        let countries = rows.iter().map(|&i| self.countries[i].clone()).collect();
        let years = rows.iter().map(|&i| self.years[i]).collect();
        let values = Mat::from_fn(rows.len(), self.n_cols(), |i, j| self.values[(rows[i], j)]);
        Panel::new(countries, years, self.names.clone(), values)
    }

    /// New panel with `column` set to `values` (replacing it if present,
    /// appending it otherwise).
    ///
    /// # Panics
    /// Panics if `values` does not have one entry per row.
    pub fn with_column(&self, name: &str, column: &Col<f64>) -> Panel {
        assert_eq!(column.nrows(), self.n_rows(), "column length mismatch");

        match self.col_index(name) {
            Some(j) => {
                let values =
                    Mat::from_fn(self.n_rows(), self.n_cols(), |i, k| {
                        if k == j {
                            column[i]
                        } else {
                            self.values[(i, k)]
                        }
                    });
                Panel::new(
                    self.countries.clone(),
                    self.years.clone(),
                    self.names.clone(),
                    values,
                )
            }
            None => {
                let mut names = self.names.clone();
                names.push(name.to_string());
                let old_cols = self.n_cols();
                let values = Mat::from_fn(self.n_rows(), old_cols + 1, |i, k| {
                    if k < old_cols {
                        self.values[(i, k)]
                    } else {
                        column[i]
                    }
                });
                Panel::new(self.countries.clone(), self.years.clone(), names, values)
            }
        }
    }

    /// Extract the named columns as a dense feature matrix, in order.
    ///
    /// Returns None if any requested column is absent.
    pub fn matrix_of(&self, names: &[String]) -> Option<Mat<f64>> {
        let cols: Option<Vec<usize>> = names.iter().map(|n| self.col_index(n)).collect();
        let cols = cols?;
        Some(Mat::from_fn(self.n_rows(), cols.len(), |i, j| {
            self.values[(i, cols[j])]
        }))
    }

    /// New panel with every row's year advanced by one and `Time` kept in
    /// sync. Used by the recursive forecast expansion when a slice is
    /// re-labeled as the following year.
    pub fn advance_year(&self) -> Panel {
        let years: Vec<i32> = self.years.iter().map(|&y| y + 1).collect();
        let time_col = self.col_index(TIME_COLUMN);
        let values = Mat::from_fn(self.n_rows(), self.n_cols(), |i, j| {
            if Some(j) == time_col {
                self.values[(i, j)] + 1.0
            } else {
                self.values[(i, j)]
            }
        });
        Panel::new(self.countries.clone(), years, self.names.clone(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_panel() -> Panel {
        let countries = vec!["AAA".into(), "AAA".into(), "BBB".into()];
        let years = vec![2000, 2001, 2000];
        let names = vec!["x".to_string(), TIME_COLUMN.to_string()];
        let mut values = Mat::zeros(3, 2);
        values[(0, 0)] = 1.0;
        values[(1, 0)] = 2.0;
        values[(2, 0)] = 3.0;
        values[(0, 1)] = 2000.0;
        values[(1, 1)] = 2001.0;
        values[(2, 1)] = 2000.0;
        Panel::new(countries, years, names, values)
    }

    #[test]
    fn test_rows_at_year() {
        let panel = small_panel();
        let slice = panel.rows_at_year(2000);
        assert_eq!(slice.n_rows(), 2);
        assert_eq!(slice.countries(), &["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn test_with_column_replaces_and_appends() {
        let panel = small_panel();

        let replaced = panel.with_column("x", &Col::from_fn(3, |i| i as f64));
        assert_eq!(replaced.n_cols(), 2);
        assert!((replaced.value(2, "x").unwrap() - 2.0).abs() < 1e-12);

        let appended = panel.with_column("y", &Col::from_fn(3, |_| 7.0));
        assert_eq!(appended.n_cols(), 3);
        assert!((appended.value(0, "y").unwrap() - 7.0).abs() < 1e-12);
        // the source panel is untouched
        assert_eq!(panel.n_cols(), 2);
    }

    #[test]
    fn test_matrix_of_missing_column() {
        let panel = small_panel();
        assert!(panel.matrix_of(&["nope".to_string()]).is_none());
    }

    #[test]
    fn test_distinct_countries_first_appearance() {
        let panel = small_panel();
        assert_eq!(
            panel.distinct_countries(),
            vec!["AAA".to_string(), "BBB".to_string()]
        );
    }

    #[test]
    fn test_advance_year_updates_time() {
        let panel = small_panel();
        let next = panel.advance_year();
        assert_eq!(next.years(), &[2001, 2002, 2001]);
        assert!((next.value(0, TIME_COLUMN).unwrap() - 2001.0).abs() < 1e-12);
    }

    #[test]
    fn test_year_bounds() {
        let panel = small_panel();
        assert_eq!(panel.year_min(), Some(2000));
        assert_eq!(panel.year_max(), Some(2001));
    }
}
