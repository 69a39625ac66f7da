//! Common test utilities and data generators.
#![allow(dead_code)]

use panelcast::core::{ForecastOptions, Panel};
use panelcast::data::{MemorySource, PanelBuilder, DEFAULT_TARGET};

/// Simple deterministic "random" generator for reproducible test data.
fn next_rand(state: &mut u64) -> f64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    ((*state >> 33) as f64) / (u32::MAX as f64) * 2.0 - 1.0
}

/// Generate a synthetic long-format source.
///
/// Each country follows a stable AR(1) target around a country-specific
/// level, with covariates of varying usefulness:
/// - `IN.LEVEL.CC` tracks the country level (informative beyond the lag)
/// - `IN.TREND.YY` tracks the year
/// - `IN.NOISE.01` / `IN.NOISE.02` are pure noise
/// - `IN.GAPPY.01` is observed only every fourth year
///
/// A `WLD`/"World" aggregate is always present so exclusion is exercised.
pub fn synthetic_source(n_countries: usize, year_min: i32, year_max: i32, seed: u64) -> MemorySource {
    let mut source = MemorySource::default();
    let mut state = seed;

    let mut codes: Vec<String> = (0..n_countries).map(|c| format!("C{c:02}")).collect();
    for (c, code) in codes.iter().enumerate() {
        source.push_country(code, &format!("Country {c:02}"));
    }
    source.push_country("WLD", "World");
    codes.push("WLD".to_string());

    for code in &codes {
        let level = 2.0 * next_rand(&mut state);
        let mut target = level;
        for year in year_min..=year_max {
            target = level + 0.5 * target + 0.3 * next_rand(&mut state);

            source.push_indicator(code, DEFAULT_TARGET, year, target);
            source.push_indicator(
                code,
                "IN.LEVEL.CC",
                year,
                level + 0.1 * next_rand(&mut state),
            );
            source.push_indicator(
                code,
                "IN.TREND.YY",
                year,
                (year - year_min) as f64 + 0.1 * next_rand(&mut state),
            );
            source.push_indicator(code, "IN.NOISE.01", year, next_rand(&mut state));
            source.push_indicator(code, "IN.NOISE.02", year, next_rand(&mut state));
            if year % 4 == 0 {
                source.push_indicator(code, "IN.GAPPY.01", year, next_rand(&mut state));
            }
        }
    }

    source
}

/// Build the panel for a synthetic source, excluding the World aggregate.
pub fn synthetic_panel(n_countries: usize, year_min: i32, year_max: i32, seed: u64) -> Panel {
    let source = synthetic_source(n_countries, year_min, year_max, seed);
    PanelBuilder::new(DEFAULT_TARGET)
        .exclude_regions(vec!["World".to_string()])
        .build(&source)
        .expect("synthetic panel should build")
}

/// Options sized for test panels: small round ceiling, small K.
pub fn test_options() -> ForecastOptions {
    ForecastOptions::builder()
        .n_features(4)
        .max_boost_rounds(40)
        .build()
        .expect("test options should validate")
}

/// The target column identifier used across tests.
pub fn target_column() -> String {
    panelcast::data::column_name(DEFAULT_TARGET)
}
