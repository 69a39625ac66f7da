//! In-memory data source.

use super::{CountryRecord, DataError, DataSource, IndicatorRecord};

/// A [`DataSource`] backed by plain vectors.
///
/// The reference implementation used by tests and by callers that already
/// hold the long rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    indicators: Vec<IndicatorRecord>,
    countries: Vec<CountryRecord>,
}

impl MemorySource {
    /// Create a source over the given rows.
    pub fn new(indicators: Vec<IndicatorRecord>, countries: Vec<CountryRecord>) -> Self {
        Self {
            indicators,
            countries,
        }
    }

    /// Append one indicator observation.
    pub fn push_indicator(&mut self, country: &str, indicator: &str, year: i32, value: f64) {
        self.indicators.push(IndicatorRecord {
            country_code: country.to_string(),
            indicator_code: indicator.to_string(),
            year,
            value,
        });
    }

    /// Append one country lookup row.
    pub fn push_country(&mut self, code: &str, long_name: &str) {
        self.countries.push(CountryRecord {
            code: code.to_string(),
            long_name: long_name.to_string(),
        });
    }
}

impl DataSource for MemorySource {
    fn indicators(&self) -> Result<Vec<IndicatorRecord>, DataError> {
        Ok(self.indicators.clone())
    }

    fn countries(&self) -> Result<Vec<CountryRecord>, DataError> {
        Ok(self.countries.clone())
    }
}
