//! Country-to-group-index encoding.

use std::collections::HashMap;

use crate::core::Panel;
use crate::solvers::ModelFitError;

/// A dense zero-based mapping from country code to group index.
///
/// Derived from first-appearance order within one panel slice, so the
/// mapping is bijective over that slice's countries but NOT stable across
/// slices with different country sets or orderings. A trained model
/// therefore carries the map it was built with, and predictions align
/// through it by code (see [`GroupEncoder::align`]) instead of trusting
/// positional agreement.
#[derive(Debug, Clone)]
pub struct GroupMap {
    codes: Vec<String>,
    index: HashMap<String, usize>,
}

impl GroupMap {
    /// Build from per-row country codes, first appearance first.
    pub fn from_countries(countries: &[String]) -> Self {
        let mut codes = Vec::new();
        let mut index = HashMap::new();
        for code in countries {
            if !index.contains_key(code) {
                index.insert(code.clone(), codes.len());
                codes.push(code.clone());
            }
        }
        Self { codes, index }
    }

    /// Number of distinct countries.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Country codes in index order.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// The group index of a country, if known.
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.index.get(code).copied()
    }
}

/// Derives grouping vectors for panel slices.
///
/// The panel's value block is purely numeric by construction (the country
/// key lives in row metadata, never as a column), so encoding only has to
/// supply the row-parallel integer vector the grouped estimators consume.
#[derive(Debug, Clone, Copy)]
pub struct GroupEncoder;

impl GroupEncoder {
    /// Group vector and map for a slice, first-appearance order within the
    /// slice. The map is bijective over the slice's countries.
    pub fn encode(panel: &Panel) -> (Vec<usize>, GroupMap) {
        let map = GroupMap::from_countries(panel.countries());
        let groups = panel
            .countries()
            .iter()
            .map(|code| map.index_of(code).unwrap_or(0))
            .collect();
        (groups, map)
    }

    /// Group vector for a slice expressed in a trained model's group space.
    ///
    /// Fails with [`ModelFitError::UnknownGroup`] when the slice contains a
    /// country the training map has never seen; attributing a random effect
    /// positionally would silently credit it to the wrong entity.
    pub fn align(panel: &Panel, map: &GroupMap) -> Result<Vec<usize>, ModelFitError> {
        panel
            .countries()
            .iter()
            .map(|code| {
                map.index_of(code).ok_or_else(|| ModelFitError::UnknownGroup {
                    code: code.clone(),
                })
            })
            .collect()
    }
}
