use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Maps upstream category names to downstream category IDs.
///
/// Loaded from YAML:
///
/// ```yaml
/// default_category: 15
/// mappings:
///   Edibles: 21
///   Pre-Rolls: 22
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMap {
    #[serde(default)]
    pub default_category: Option<i64>,
    #[serde(default)]
    pub mappings: BTreeMap<String, i64>,
}

/// Result of resolving an upstream category against a [`CategoryMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryAssignment {
    Mapped(i64),
    Default(i64),
    Unassigned,
}

impl CategoryAssignment {
    #[must_use]
    pub fn id(self) -> Option<i64> {
        match self {
            Self::Mapped(id) | Self::Default(id) => Some(id),
            Self::Unassigned => None,
        }
    }
}

impl CategoryMap {
    /// Exact name match first, then a case-insensitive match, then the default.
    #[must_use]
    pub fn resolve(&self, category: Option<&str>) -> CategoryAssignment {
        let name = category.map(str::trim).filter(|c| !c.is_empty());

        if let Some(name) = name {
            if let Some(id) = self.mappings.get(name) {
                return CategoryAssignment::Mapped(*id);
            }
            if let Some((_, id)) = self
                .mappings
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
            {
                return CategoryAssignment::Mapped(*id);
            }
        }

        match self.default_category {
            Some(id) => CategoryAssignment::Default(id),
            None => CategoryAssignment::Unassigned,
        }
    }
}

/// Load and validate the category mapping from a YAML file.
///
/// A missing file yields an empty map: every product then falls back to
/// "no category".
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read, parsed, or
/// fails validation.
pub fn load_category_map(path: &Path) -> Result<CategoryMap, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no category map file; using empty map");
            return Ok(CategoryMap::default());
        }
        Err(e) => {
            return Err(ConfigError::CategoryFileIo {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    let map: CategoryMap = serde_yaml::from_str(&content)?;
    validate_category_map(&map)?;
    Ok(map)
}

fn validate_category_map(map: &CategoryMap) -> Result<(), ConfigError> {
    if let Some(id) = map.default_category {
        if id <= 0 {
            return Err(ConfigError::Validation(format!(
                "default_category must be a positive id, got {id}"
            )));
        }
    }

    let mut seen = HashSet::new();
    for (name, id) in &map.mappings {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category name must be non-empty".to_string(),
            ));
        }
        if *id <= 0 {
            return Err(ConfigError::Validation(format!(
                "category '{name}' has invalid id {id}; must be positive"
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category name (case-insensitive): '{name}'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "category_test.rs"]
mod tests;
