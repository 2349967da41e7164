//! Named transform table.
//!
//! The registry maps directive names (the tokens that appear in request
//! paths) to transform entries. It is built once from configuration and then
//! shared read-only between all requests.

use std::collections::HashMap;

use crate::error::ConfigError;

use super::spec::TransformEntry;

/// Immutable map from directive name to transform entry.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    entries: HashMap<String, TransformEntry>,
}

impl TransformRegistry {
    /// Build a registry, validating every configured spec.
    pub fn new(entries: HashMap<String, TransformEntry>) -> Result<Self, ConfigError> {
        for (name, entry) in &entries {
            if name.is_empty() || name.contains(',') || name.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "invalid directive name {name:?}: must be non-empty without ',' or '/'"
                )));
            }
            if entry.specs().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "directive {name:?} has no operations"
                )));
            }
            for spec in entry.specs() {
                spec.validate()
                    .map_err(|e| ConfigError::Invalid(format!("directive {name:?}: {e}")))?;
            }
        }

        Ok(Self { entries })
    }

    /// Create a registry with no directives.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON transformation table.
    ///
    /// ```ignore
    /// {
    ///   "thumb": {"type": "resize", "width": 200},
    ///   "card": [
    ///     {"type": "resize", "width": 640},
    ///     {"type": "crop", "width": 100, "height": 100, "gravity": "smart"}
    ///   ]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: HashMap<String, TransformEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    /// Look up a directive by exact name.
    pub fn get(&self, name: &str) -> Option<&TransformEntry> {
        self.entries.get(name)
    }

    /// Number of configured directives.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no directives are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured directive names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<N: Into<String>, E: Into<TransformEntry>> FromIterator<(N, E)> for TransformRegistry {
    /// Collect without validation; intended for tests and programmatic setup
    /// with known-good specs.
    fn from_iter<I: IntoIterator<Item = (N, E)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, entry)| (name.into(), entry.into()))
                .collect(),
        }
    }
}
