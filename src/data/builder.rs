//! Long-to-wide panel assembly.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use faer::{Col, Mat};
use log::{debug, info};

use super::{column_name, DataError, DataSource};
use crate::core::{Panel, LAG_COLUMN, TIME_COLUMN};

/// Reshapes long (country, indicator, year, value) records into the wide
/// panel consumed by the rest of the pipeline.
///
/// The builder filters out rows belonging to excluded region aggregates,
/// pivots into one row per (country, year) with one column per indicator
/// (summing on key collision), then derives `Time` and the one-period lag of
/// the target. Rows missing the target or its lag are dropped, so every
/// retained row satisfies `lag1(c, y) == target(c, y-1)`.
///
/// # Example
///
/// ```rust,ignore
/// use panelcast::data::{PanelBuilder, MemorySource, DEFAULT_TARGET};
///
/// let panel = PanelBuilder::new(DEFAULT_TARGET)
///     .exclude_regions(panelcast::data::default_excluded_regions())
///     .build(&source)?;
/// ```
#[derive(Debug, Clone)]
pub struct PanelBuilder {
    target: String,
    excluded_regions: Vec<String>,
}

impl PanelBuilder {
    /// Create a builder for the given target indicator (storage notation).
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            excluded_regions: Vec::new(),
        }
    }

    /// Set the region long-names to exclude from the panel.
    pub fn exclude_regions(mut self, regions: Vec<String>) -> Self {
        self.excluded_regions = regions;
        self
    }

    /// The target column identifier (underscore notation).
    pub fn target_column(&self) -> String {
        column_name(&self.target)
    }

    /// Assemble the panel from a data source.
    pub fn build(&self, source: &dyn DataSource) -> Result<Panel, DataError> {
        let excluded_codes = self.resolve_excluded_codes(source)?;
        let records = source.indicators()?;

        info!(
            "building panel: {} long records, {} excluded region codes",
            records.len(),
            excluded_codes.len()
        );

        // Pivot into (country, year) rows and indicator columns. BTreeMap /
        // BTreeSet keep row and column order deterministic regardless of
        // source ordering.
        let mut columns: BTreeSet<String> = BTreeSet::new();
        let mut cells: BTreeMap<(String, i32), HashMap<String, f64>> = BTreeMap::new();

        for record in &records {
            if excluded_codes.contains(&record.country_code) {
                continue;
            }
            let name = column_name(&record.indicator_code);
            columns.insert(name.clone());
            let row = cells
                .entry((record.country_code.clone(), record.year))
                .or_default();
            // Key collisions are not expected, but must not fail: sum.
            *row.entry(name).or_insert(0.0) += record.value;
        }

        let target_column = self.target_column();
        if !columns.contains(&target_column) {
            return Err(DataError::MissingTargetColumn {
                target: self.target.clone(),
            });
        }

        let names: Vec<String> = columns.into_iter().collect();
        let countries: Vec<String> = cells.keys().map(|(c, _)| c.clone()).collect();
        let years: Vec<i32> = cells.keys().map(|&(_, y)| y).collect();

        let values = {
            let rows: Vec<&HashMap<String, f64>> = cells.values().collect();
            Mat::from_fn(rows.len(), names.len(), |i, j| {
                rows[i].get(&names[j]).copied().unwrap_or(f64::NAN)
            })
        };

        let panel = Panel::new(countries, years, names, values);
        debug!(
            "pivoted panel: {} rows x {} columns",
            panel.n_rows(),
            panel.n_cols()
        );

        let panel = self.derive_columns(&panel, &target_column);
        let panel = drop_unlabeled_rows(&panel, &target_column);

        if panel.is_empty() {
            return Err(DataError::EmptyPanel);
        }

        info!(
            "panel ready: {} rows, {} countries, years {}..={}",
            panel.n_rows(),
            panel.distinct_countries().len(),
            panel.year_min().unwrap_or(0),
            panel.year_max().unwrap_or(0)
        );
        Ok(panel)
    }

    /// Map excluded long-names to country codes through the lookup table.
    fn resolve_excluded_codes(&self, source: &dyn DataSource) -> Result<HashSet<String>, DataError> {
        if self.excluded_regions.is_empty() {
            return Ok(HashSet::new());
        }

        let excluded: HashSet<&str> = self.excluded_regions.iter().map(|s| s.as_str()).collect();
        Ok(source
            .countries()?
            .into_iter()
            .filter(|c| excluded.contains(c.long_name.as_str()))
            .map(|c| c.code)
            .collect())
    }

    /// Append `Time` and the per-country one-period lag of the target.
    fn derive_columns(&self, panel: &Panel, target_column: &str) -> Panel {
        let time = Col::from_fn(panel.n_rows(), |i| panel.years()[i] as f64);
        let panel = panel.with_column(TIME_COLUMN, &time);

        // lag1(c, y) = target(c, y - 1); NaN when the prior year is absent.
        let mut by_key: HashMap<(&str, i32), f64> = HashMap::new();
        let target = panel
            .column(target_column)
            .unwrap_or_else(|| vec![f64::NAN; panel.n_rows()]);
        for i in 0..panel.n_rows() {
            by_key.insert((panel.countries()[i].as_str(), panel.years()[i]), target[i]);
        }

        let lag = Col::from_fn(panel.n_rows(), |i| {
            by_key
                .get(&(panel.countries()[i].as_str(), panel.years()[i] - 1))
                .copied()
                .unwrap_or(f64::NAN)
        });
        panel.with_column(LAG_COLUMN, &lag)
    }
}

/// Keep only rows where both the target and its lag are observed.
fn drop_unlabeled_rows(panel: &Panel, target_column: &str) -> Panel {
    let target = panel
        .column(target_column)
        .unwrap_or_else(|| vec![f64::NAN; panel.n_rows()]);
    let lag = panel
        .column(LAG_COLUMN)
        .unwrap_or_else(|| vec![f64::NAN; panel.n_rows()]);

    let keep: Vec<usize> = (0..panel.n_rows())
        .filter(|&i| !target[i].is_nan() && !lag[i].is_nan())
        .collect();
    panel.take_rows(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemorySource;

    fn source_with_two_countries() -> MemorySource {
        let mut source = MemorySource::default();
        source.push_country("AAA", "Aland");
        source.push_country("BBB", "Borduria");
        source.push_country("WLD", "World");
        for year in 2000..=2003 {
            for code in ["AAA", "BBB", "WLD"] {
                source.push_indicator(code, "NY.GDP.MKTP.KD.ZG", year, (year - 2000) as f64);
                source.push_indicator(code, "SP.POP.TOTL", year, 1000.0 + year as f64);
            }
        }
        source
    }

    #[test]
    fn test_excluded_regions_are_filtered() {
        let source = source_with_two_countries();
        let panel = PanelBuilder::new("NY.GDP.MKTP.KD.ZG")
            .exclude_regions(vec!["World".to_string()])
            .build(&source)
            .unwrap();

        assert!(!panel.distinct_countries().contains(&"WLD".to_string()));
        assert_eq!(panel.distinct_countries().len(), 2);
    }

    #[test]
    fn test_lag_rows_dropped_at_panel_start() {
        let source = source_with_two_countries();
        let panel = PanelBuilder::new("NY.GDP.MKTP.KD.ZG")
            .build(&source)
            .unwrap();

        // 2000 has no lag year, so each country keeps 2001..=2003.
        assert_eq!(panel.year_min(), Some(2001));
        assert_eq!(panel.year_max(), Some(2003));
    }

    #[test]
    fn test_lag_matches_prior_year_target() {
        let source = source_with_two_countries();
        let panel = PanelBuilder::new("NY.GDP.MKTP.KD.ZG")
            .build(&source)
            .unwrap();

        let target = panel.column("NY_GDP_MKTP_KD_ZG").unwrap();
        let lag = panel.column(LAG_COLUMN).unwrap();
        for i in 0..panel.n_rows() {
            // target is (year - 2000), so the lag is one less.
            assert!((lag[i] - (target[i] - 1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_collision_sums() {
        let mut source = MemorySource::default();
        source.push_country("AAA", "Aland");
        source.push_indicator("AAA", "NY.GDP.MKTP.KD.ZG", 2000, 1.0);
        source.push_indicator("AAA", "NY.GDP.MKTP.KD.ZG", 2001, 2.0);
        source.push_indicator("AAA", "NY.GDP.MKTP.KD.ZG", 2001, 3.0);

        let panel = PanelBuilder::new("NY.GDP.MKTP.KD.ZG")
            .build(&source)
            .unwrap();

        // 2001 survives (lag from 2000) with the summed value 5.0.
        assert_eq!(panel.n_rows(), 1);
        assert!((panel.value(0, "NY_GDP_MKTP_KD_ZG").unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_target_column_fails() {
        let mut source = MemorySource::default();
        source.push_country("AAA", "Aland");
        source.push_indicator("AAA", "SP.POP.TOTL", 2000, 1.0);

        let result = PanelBuilder::new("NY.GDP.MKTP.KD.ZG").build(&source);
        assert!(matches!(
            result,
            Err(DataError::MissingTargetColumn { .. })
        ));
    }

    #[test]
    fn test_time_column_mirrors_year() {
        let source = source_with_two_countries();
        let panel = PanelBuilder::new("NY.GDP.MKTP.KD.ZG")
            .build(&source)
            .unwrap();

        for i in 0..panel.n_rows() {
            let time = panel.value(i, TIME_COLUMN).unwrap();
            assert!((time - panel.years()[i] as f64).abs() < 1e-12);
        }
    }
}
