//! Selected-feature set produced by the covariate screen.

/// One covariate with its importance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFeature {
    /// Column name (underscore notation).
    pub name: String,
    /// Mutual information against the residual response. NaN when the set
    /// was restored from a cache, which persists names only.
    pub importance: f64,
}

/// A ranked list of covariates retained for model training.
///
/// Ordered by importance, descending; never contains the target indicator,
/// the residual column, or the country key. Once persisted through a
/// selection cache the set is reused verbatim until the cache is
/// invalidated.
#[derive(Debug, Clone, Default)]
pub struct SelectedFeatures {
    features: Vec<RankedFeature>,
}

impl SelectedFeatures {
    /// Build from ranked (name, importance) pairs, highest first.
    pub fn new(features: Vec<RankedFeature>) -> Self {
        Self { features }
    }

    /// Rebuild from bare column names (a cache hit). Importance scores are
    /// unknown and stored as NaN.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let features = names
            .into_iter()
            .map(|name| RankedFeature {
                name: name.into(),
                importance: f64::NAN,
            })
            .collect();
        Self { features }
    }

    /// The ranked features, highest importance first.
    pub fn features(&self) -> &[RankedFeature] {
        &self.features
    }

    /// Column names in rank order.
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Number of retained covariates.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if no covariates were retained.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// True if the named column is part of the selection.
    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_names_has_nan_importance() {
        let selected = SelectedFeatures::from_names(["a", "b"]);
        assert_eq!(selected.len(), 2);
        assert!(selected.features()[0].importance.is_nan());
        assert!(selected.contains("b"));
        assert!(!selected.contains("c"));
    }

    #[test]
    fn test_names_preserve_rank_order() {
        let selected = SelectedFeatures::new(vec![
            RankedFeature {
                name: "hi".into(),
                importance: 0.9,
            },
            RankedFeature {
                name: "lo".into(),
                importance: 0.1,
            },
        ]);
        assert_eq!(selected.names(), vec!["hi".to_string(), "lo".to_string()]);
    }
}
