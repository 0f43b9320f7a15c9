use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

const DEFAULT_DATABASE_FILE: &str = "packages.sqlite3";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub database_path: PathBuf,
    /// JSON package manifest used to populate a cold cache.
    pub manifest_path: Option<PathBuf>,
    /// `tracing` filter directive, e.g. `"pkgcache_core=debug"`.
    pub log_filter: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            manifest_path: None,
            log_filter: None,
        }
    }
}

impl CacheConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("failed to read config '{}': {error}", path.display()),
            )
        })?;
        Self::from_json(&raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid config '{}': {}", path.display(), error.message),
            )
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw)
            .map_err(|error| CoreError::new(CoreErrorKind::InvalidInput, error.to_string()))
    }
}

/// `$HOME/.cache/pkgcache/packages.sqlite3`, or a file in the working
/// directory when `HOME` is unset.
pub fn default_database_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".cache")
            .join("pkgcache")
            .join(DEFAULT_DATABASE_FILE),
        None => PathBuf::from(DEFAULT_DATABASE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = CacheConfig::from_json(r#"{"manifest_path":"/srv/packages.json"}"#).unwrap();
        assert_eq!(config.database_path, default_database_path());
        assert_eq!(config.manifest_path, Some(PathBuf::from("/srv/packages.json")));
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn malformed_json_is_invalid_input() {
        let error = CacheConfig::from_json("{not json").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn default_database_file_name_is_stable() {
        assert!(default_database_path().ends_with(DEFAULT_DATABASE_FILE));
    }
}
