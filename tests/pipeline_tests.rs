//! End-to-end pipeline tests.

mod common;

use common::{synthetic_source, test_options};
use panelcast::pipeline::{MemorySink, Pipeline, ResultSink};
use panelcast::selection::{FileSelectionCache, NoCache};

#[test]
fn test_full_run_produces_one_row_per_country() {
    let source = synthetic_source(5, 2000, 2010, 77);
    let pipeline = Pipeline::new(test_options());
    let mut sink = MemorySink::new();

    let rows = pipeline.run(&source, &NoCache, 2011, &mut sink).unwrap();

    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.year == 2011));
    assert!(rows.iter().all(|r| r.value.is_finite()));
    // The World aggregate is excluded by default.
    assert!(!rows.iter().any(|r| r.country == "WLD"));
    assert_eq!(sink.rows(), rows.as_slice());
}

#[test]
fn test_recursive_target_year_through_pipeline() {
    let source = synthetic_source(4, 2000, 2010, 77);
    let pipeline = Pipeline::new(test_options());
    let mut sink = MemorySink::new();

    let rows = pipeline.run(&source, &NoCache, 2013, &mut sink).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.year == 2013));
}

#[test]
fn test_rerun_is_idempotent_with_warm_cache() {
    let source = synthetic_source(5, 2000, 2010, 77);
    let dir = tempfile::tempdir().unwrap();
    let cache = FileSelectionCache::new(dir.path().join("selected_variables.csv"));
    let pipeline = Pipeline::new(test_options());

    let mut sink = MemorySink::new();
    let first = pipeline.run(&source, &cache, 2012, &mut sink).unwrap();
    assert!(cache.path().exists(), "first run writes the cache");

    let second = pipeline.run(&source, &cache, 2012, &mut sink).unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.country, b.country);
        assert_eq!(a.year, b.year);
        assert_eq!(a.value.to_bits(), b.value.to_bits(), "forecasts must be reproducible");
    }
}

#[test]
fn test_cached_selection_is_reused_verbatim() {
    let source = synthetic_source(5, 2000, 2010, 77);
    let dir = tempfile::tempdir().unwrap();
    let cache = FileSelectionCache::new(dir.path().join("selected_variables.csv"));
    let pipeline = Pipeline::new(test_options());

    let mut sink = MemorySink::new();
    pipeline.run(&source, &cache, 2011, &mut sink).unwrap();
    let written = std::fs::read_to_string(cache.path()).unwrap();

    pipeline.run(&source, &cache, 2011, &mut sink).unwrap();
    let after = std::fs::read_to_string(cache.path()).unwrap();
    assert_eq!(written, after, "a warm cache is not rewritten");
}

#[test]
fn test_sink_content_is_replaced_not_appended() {
    let source = synthetic_source(4, 2000, 2010, 77);
    let pipeline = Pipeline::new(test_options());
    let mut sink = MemorySink::new();

    sink.replace(&[panelcast::pipeline::ForecastRow {
        country: "OLD".into(),
        year: 1999,
        value: 0.0,
    }])
    .unwrap();

    pipeline.run(&source, &NoCache, 2011, &mut sink).unwrap();
    assert!(!sink.rows().iter().any(|r| r.country == "OLD"));
    assert_eq!(sink.rows().len(), 4);
}
