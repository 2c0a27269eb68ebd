//! Animation clip enumeration without baking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::document::Model;
use crate::error::AssetError;

/// Name reported for clips that carry none.
pub const DEFAULT_CLIP_NAME: &str = "default";

/// Summary of one animation clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub name: String,
    /// Latest final keyframe across the clip's channels, in seconds.
    pub duration: f32,
    pub channel_count: usize,
}

/// All clips defined by one file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationSet {
    pub clips: Vec<ClipInfo>,
}

impl AnimationSet {
    /// Look up a clip by name.
    pub fn clip(&self, name: &str) -> Option<&ClipInfo> {
        self.clips.iter().find(|clip| clip.name == name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Display name of an animation, falling back to [`DEFAULT_CLIP_NAME`].
pub fn clip_name(animation: &gltf::Animation) -> String {
    animation.name().unwrap_or(DEFAULT_CLIP_NAME).to_string()
}

/// Duration of a clip: the maximum final timestamp across its channels.
///
/// Channels whose input accessor cannot be read are skipped.
pub fn clip_duration(model: &Model, animation: &gltf::Animation) -> f32 {
    let mut duration = 0.0f32;
    for (index, channel) in animation.channels().enumerate() {
        match model.read_scalars(&channel.sampler().input()) {
            Ok(times) => {
                if let Some(&last) = times.last() {
                    duration = duration.max(last);
                }
            }
            Err(e) => debug!(
                "Skipping channel {} of '{}': {}",
                index,
                clip_name(animation),
                e
            ),
        }
    }
    duration
}

/// Enumerate the clips of an already loaded model.
pub fn index_model(model: &Model) -> Result<AnimationSet, AssetError> {
    let clips: Vec<ClipInfo> = model
        .document()
        .animations()
        .map(|animation| ClipInfo {
            name: clip_name(&animation),
            duration: clip_duration(model, &animation),
            channel_count: animation.channels().count(),
        })
        .collect();

    if clips.is_empty() {
        return Err(AssetError::NoAnimations(model.path().to_path_buf()));
    }
    Ok(AnimationSet { clips })
}

/// Load a file and enumerate its clips.
pub fn index_clips(path: &Path) -> Result<AnimationSet, AssetError> {
    let model = Model::open(path)?;
    index_model(&model)
}

/// Memoized clip listings keyed by resolved path.
///
/// The first outcome for a path, success or failure, is kept and replayed on
/// every later request. Entries are never refreshed when the file changes;
/// use [`AnimationIndex::forget`] to drop one explicitly.
#[derive(Default)]
pub struct AnimationIndex {
    entries: Mutex<HashMap<PathBuf, Result<Arc<AnimationSet>, AssetError>>>,
}

impl AnimationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached listing for `path`, loading it on first request.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<AnimationSet>, AssetError> {
        if let Some(cached) = self.entries.lock().get(path) {
            return cached.clone();
        }

        // Loaded outside the lock; a concurrent first load of the same path
        // keeps whichever outcome was stored first.
        let outcome = index_clips(path).map(Arc::new);
        self.entries
            .lock()
            .entry(path.to_path_buf())
            .or_insert(outcome)
            .clone()
    }

    /// Drop the cached outcome for one path.
    pub fn forget(&self, path: &Path) -> bool {
        self.entries.lock().remove(path).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
