//! Data access: long-format indicator rows and the country lookup.
//!
//! Storage keeps indicator codes in dot notation (`NY.GDP.MKTP.KD.ZG`);
//! formula and column consumers downstream reject dots in identifiers, so
//! codes are translated to underscore notation the moment they enter the
//! pipeline and translated back only at persistence boundaries.

mod builder;
mod memory;

pub use builder::PanelBuilder;
pub use memory::MemorySource;

use thiserror::Error;

/// The indicator forecast by the production configuration: annual GDP
/// growth, in storage (dot) notation.
pub const DEFAULT_TARGET: &str = "NY.GDP.MKTP.KD.ZG";

/// Errors raised while assembling the panel from a data source.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data source error: {0}")]
    Source(String),

    #[error("target indicator {target} is absent from the pivoted panel")]
    MissingTargetColumn { target: String },

    #[error("expected column {name} is absent from the panel")]
    MissingColumn { name: String },

    #[error("panel has no rows after filtering and lag construction")]
    EmptyPanel,

    #[error("selection cache error: {0}")]
    Cache(String),
}

/// One long-format observation: a value for one indicator, one country, one
/// year.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub country_code: String,
    pub indicator_code: String,
    pub year: i32,
    pub value: f64,
}

/// One row of the country lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRecord {
    pub code: String,
    pub long_name: String,
}

/// A tabular source of indicator observations and country names.
///
/// Implementations wrap whatever storage holds the panel (a database, files,
/// memory). The pipeline only ever sees these two row streams.
pub trait DataSource {
    /// All long-format indicator observations.
    fn indicators(&self) -> Result<Vec<IndicatorRecord>, DataError>;

    /// The country-code / long-name lookup table.
    fn countries(&self) -> Result<Vec<CountryRecord>, DataError>;
}

/// Translate a storage indicator code to a column identifier
/// (`NY.GDP.MKTP.KD.ZG` → `NY_GDP_MKTP_KD_ZG`).
pub fn column_name(code: &str) -> String {
    code.replace('.', "_")
}

/// Translate a column identifier back to its storage code
/// (`NY_GDP_MKTP_KD_ZG` → `NY.GDP.MKTP.KD.ZG`).
pub fn indicator_code(name: &str) -> String {
    name.replace('_', ".")
}

/// Aggregate long-names that are present in the source alongside real
/// countries but denote regions or income groups. Rows for these are
/// excluded before the pivot by default.
pub fn default_excluded_regions() -> Vec<String> {
    [
        "Arab World",
        "Caribbean small states",
        "Central Europe and the Baltics",
        "East Asia & Pacific (all income levels)",
        "East Asia & Pacific (developing only)",
        "Euro area",
        "Europe & Central Asia (all income levels)",
        "Europe & Central Asia (developing only)",
        "European Union",
        "Fragile and conflict affected situations",
        "Heavily indebted poor countries (HIPC)",
        "High income",
        "High income: nonOECD",
        "High income: OECD",
        "Latin America & Caribbean (all income levels)",
        "Latin America & Caribbean (developing only)",
        "Least developed countries: UN classification",
        "Low & middle income",
        "Low income",
        "Lower middle income",
        "Middle East & North Africa (all income levels)",
        "Middle East & North Africa (developing only)",
        "Middle income",
        "North America",
        "OECD members",
        "Other small states",
        "Pacific island small states",
        "Small states",
        "South Asia",
        "Sub-Saharan Africa (all income levels)",
        "Sub-Saharan Africa (developing only)",
        "Upper middle income",
        "World",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_translation_round_trip() {
        let code = "NY.GDP.MKTP.KD.ZG";
        let name = column_name(code);
        assert_eq!(name, "NY_GDP_MKTP_KD_ZG");
        assert_eq!(indicator_code(&name), code);
    }

    #[test]
    fn test_default_target_is_dot_notation() {
        assert!(DEFAULT_TARGET.contains('.'));
        assert!(!DEFAULT_TARGET.contains('_'));
    }

    #[test]
    fn test_excluded_regions_contains_aggregates() {
        let regions = default_excluded_regions();
        assert!(regions.iter().any(|r| r == "World"));
        assert!(regions.iter().any(|r| r == "Euro area"));
        assert!(!regions.iter().any(|r| r == "Germany"));
    }
}
