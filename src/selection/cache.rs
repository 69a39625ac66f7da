//! Persistence of the selected-feature list.
//!
//! Selection is expensive, so the ranked list survives across runs through
//! an injected cache rather than an ambient file-path check. A populated
//! cache is reused verbatim until it is removed or overwritten.

use std::fs;
use std::path::PathBuf;

use log::info;

use crate::core::SelectedFeatures;
use crate::data::{column_name, indicator_code, DataError};

/// Header line of the cache file.
const HEADER: &str = "name";

/// Storage for a previously selected feature list.
pub trait SelectionCache {
    /// The cached selection, or None when the cache is cold.
    fn load(&self) -> Result<Option<SelectedFeatures>, DataError>;

    /// Persist a freshly computed selection.
    fn store(&self, selected: &SelectedFeatures) -> Result<(), DataError>;
}

/// A cache that never hits; selection recomputes on every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl SelectionCache for NoCache {
    fn load(&self) -> Result<Option<SelectedFeatures>, DataError> {
        Ok(None)
    }

    fn store(&self, _selected: &SelectedFeatures) -> Result<(), DataError> {
        Ok(())
    }
}

/// File-backed cache: a `name` header followed by one indicator per line, in
/// storage (dot) notation, rank order preserved.
#[derive(Debug, Clone)]
pub struct FileSelectionCache {
    path: PathBuf,
}

impl FileSelectionCache {
    /// Create a cache at the given path. The file is created on the first
    /// `store`; a missing file means a cold cache, not an error.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SelectionCache for FileSelectionCache {
    fn load(&self) -> Result<Option<SelectedFeatures>, DataError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| DataError::Cache(format!("{}: {e}", self.path.display())))?;

        let mut lines = content.lines();
        match lines.next() {
            Some(header) if header.trim() == HEADER => {}
            _ => {
                return Err(DataError::Cache(format!(
                    "{}: missing '{HEADER}' header",
                    self.path.display()
                )))
            }
        }

        let names: Vec<String> = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(column_name)
            .collect();

        info!(
            "selection cache hit: {} features from {}",
            names.len(),
            self.path.display()
        );
        Ok(Some(SelectedFeatures::from_names(names)))
    }

    fn store(&self, selected: &SelectedFeatures) -> Result<(), DataError> {
        let mut content = String::from(HEADER);
        content.push('\n');
        for feature in selected.features() {
            content.push_str(&indicator_code(&feature.name));
            content.push('\n');
        }

        fs::write(&self.path, content)
            .map_err(|e| DataError::Cache(format!("{}: {e}", self.path.display())))?;
        info!(
            "selection cache written: {} features to {}",
            selected.len(),
            self.path.display()
        );
        Ok(())
    }
}
