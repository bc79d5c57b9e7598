use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Where the SQLite database lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseLocation {
    /// A private in-memory database, discarded on shutdown.
    Memory,
    /// A database file, created if missing.
    Path(PathBuf),
}

/// Configuration for [`SqliteStore`](crate::SqliteStore).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseLocation,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// A configuration for an on-disk database at `path`.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseLocation::Path(path.into()),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.database, DatabaseLocation::Memory);
        assert_eq!(c.busy_timeout_ms, 5_000);
    }

    #[test]
    fn parses_path_location() {
        let c = StoreConfig::from_toml_str(
            r#"
            busy_timeout_ms = 250

            [database]
            path = "/var/lib/canopy/blocks.db"
            "#,
        )
        .unwrap();
        assert_eq!(
            c.database,
            DatabaseLocation::Path(PathBuf::from("/var/lib/canopy/blocks.db"))
        );
        assert_eq!(c.busy_timeout_ms, 250);
    }

    #[test]
    fn parses_memory_location() {
        let c = StoreConfig::from_toml_str(r#"database = "memory""#).unwrap();
        assert_eq!(c.database, DatabaseLocation::Memory);
    }

    #[test]
    fn empty_document_is_default() {
        let c = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(c.database, DatabaseLocation::Memory);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = StoreConfig::from_toml_str("busy_timeout_ms = [").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
