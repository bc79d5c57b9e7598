use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use canopy_store::{StoreError, StoreResult};

/// Configuration for [`AuthLayer`](crate::AuthLayer).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthLayerConfig {
    /// SQLite file of the external directory. Opened read only; never created.
    pub directory_path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for AuthLayerConfig {
    fn default() -> Self {
        Self {
            directory_path: PathBuf::new(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl AuthLayerConfig {
    pub fn new(directory_path: impl Into<PathBuf>) -> Self {
        Self {
            directory_path: directory_path.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }
}
