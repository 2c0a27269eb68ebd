//! Asset pipeline configuration, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AssetError;

/// Mesh cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Consult and populate the persistent mesh cache.
    pub enabled: bool,
    /// Explicit cache directory; the platform cache directory is used when unset.
    pub directory: Option<PathBuf>,
    /// Keep decoded meshes in memory in front of the disk store.
    pub memory: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            memory: true,
        }
    }
}

impl CacheConfig {
    /// Directory the mesh cache lives in.
    pub fn resolved_directory(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .map(|dir| dir.join("kiln"))
                .unwrap_or_else(|| PathBuf::from(".kiln-cache"))
                .join("meshes"),
        }
    }
}

/// Top-level asset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Root that relative asset paths resolve against.
    pub base_path: PathBuf,
    pub cache: CacheConfig,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            cache: CacheConfig::default(),
        }
    }
}

impl AssetConfig {
    /// Config rooted at `base_path` with default cache settings.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AssetError> {
        toml::from_str(content).map_err(|e| AssetError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, AssetError> {
        toml::to_string_pretty(self).map_err(|e| AssetError::Config(e.to_string()))
    }

    /// Load a config file, failing on unreadable or malformed content.
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let content = fs::read_to_string(path).map_err(|e| AssetError::io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded asset config from {:?}", path);
        Ok(config)
    }

    /// Load a config file, or return defaults if it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No asset config at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }
}
