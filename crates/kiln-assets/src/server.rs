use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::animation::{AnimationIndex, AnimationSet};
use crate::cache::{CacheKey, MeshCache};
use crate::config::AssetConfig;
use crate::error::AssetError;
use crate::gltf_loader::{self, split_selector, SELECTOR_SEPARATOR};
use crate::mesh::MeshData;
use crate::skin::{self, BakedSkinningFrames};

/// Entry point for asset requests. Resolves paths against the configured
/// base path and routes meshes through the mesh cache and clip listings
/// through the animation index.
pub struct AssetServer {
    config: AssetConfig,
    mesh_cache: Option<MeshCache>,
    animations: AnimationIndex,
}

impl AssetServer {
    /// Create a new AssetServer rooted at the given base path, with default
    /// cache settings.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_config(AssetConfig::with_base_path(base_path))
    }

    pub fn with_config(config: AssetConfig) -> Self {
        let mesh_cache = config.cache.enabled.then(|| {
            MeshCache::with_memory(config.cache.resolved_directory(), config.cache.memory)
        });
        match &mesh_cache {
            Some(cache) => info!(
                "AssetServer created with base path: {}, mesh cache: {}",
                config.base_path.display(),
                cache.directory().display()
            ),
            None => info!(
                "AssetServer created with base path: {}, mesh cache disabled",
                config.base_path.display()
            ),
        }
        Self {
            config,
            mesh_cache,
            animations: AnimationIndex::new(),
        }
    }

    /// Resolve an asset path against the base path. Existing files are
    /// canonicalized so that different spellings share cache entries.
    fn resolve(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.base_path.join(path)
        };
        joined.canonicalize().unwrap_or(joined)
    }

    /// Load the meshes selected by `path#selector...` as one flat triangle
    /// list, consulting the mesh cache first.
    ///
    /// Cache write failures are logged and do not fail the load.
    pub fn load_mesh(&self, path: &str) -> Result<MeshData, AssetError> {
        let (file, selectors) = split_selector(path);
        let full_path = self.resolve(Path::new(file));
        if !full_path.is_file() {
            return Err(AssetError::NotFound(full_path));
        }

        let key = CacheKey::for_path(&cache_identity(&full_path, &selectors));
        if let Some(mesh) = self.mesh_cache.as_ref().and_then(|cache| cache.get(key)) {
            return Ok(mesh);
        }

        let mesh = gltf_loader::extract_mesh(&full_path, selectors.as_slice())?;
        info!(
            "Extracted {} triangles from '{}'",
            mesh.triangle_count(),
            path
        );

        if let Some(cache) = &self.mesh_cache {
            if let Err(e) = cache.put(key, &mesh) {
                warn!("Failed to cache mesh '{}': {}", path, e);
            }
        }
        Ok(mesh)
    }

    /// Clip names and durations of an animation file. The first outcome for
    /// each resolved path is memoized.
    pub fn animation_clips(&self, path: &Path) -> Result<Arc<AnimationSet>, AssetError> {
        self.animations.get_or_load(&self.resolve(path))
    }

    /// Bake skinning matrices for the first skin of `model`, driven by the
    /// clip selected by `animation` (`file#clip`, first clip when omitted).
    pub fn bake_skinning(
        &self,
        model: &Path,
        animation: &str,
    ) -> Result<BakedSkinningFrames, AssetError> {
        let (file, selectors) = split_selector(animation);
        if selectors.len() > 1 {
            warn!(
                "Only the first clip selector of '{}' is used",
                animation
            );
        }
        let model_path = self.resolve(model);
        let animation_path = self.resolve(Path::new(file));
        skin::bake_skinning(&model_path, &animation_path, selectors.first().copied())
    }

    /// The base path this server resolves relative paths against.
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// The mesh cache, if enabled.
    pub fn mesh_cache(&self) -> Option<&MeshCache> {
        self.mesh_cache.as_ref()
    }

    pub fn animation_index(&self) -> &AnimationIndex {
        &self.animations
    }
}

/// String hashed into the cache key: the resolved path plus its selectors,
/// so different selections of one file are cached separately.
fn cache_identity(path: &Path, selectors: &[&str]) -> String {
    let mut identity = path.to_string_lossy().into_owned();
    for selector in selectors {
        identity.push(SELECTOR_SEPARATOR);
        identity.push_str(selector);
    }
    identity
}
