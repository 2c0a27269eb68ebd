use std::path::PathBuf;
use std::sync::Arc;

use kiln_core::ClockError;

use crate::decode::DecodeError;

/// Errors that can occur during asset loading.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error loading '{0}': {1}")]
    Io(PathBuf, #[source] Arc<std::io::Error>),

    #[error("failed to load glTF file '{0}': {1}")]
    GltfLoadFailed(PathBuf, String),

    #[error("unreadable buffer data in '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("no mesh or mesh node named '{selector}' in '{path}'")]
    MeshNotFound { path: PathBuf, selector: String },

    #[error("no selected primitive in '{0}' has a POSITION attribute")]
    MissingPosition(PathBuf),

    #[error("index {index} in '{path}' addresses past {vertex_count} vertices")]
    IndexOutOfRange {
        path: PathBuf,
        index: u32,
        vertex_count: usize,
    },

    #[error("'{0}' defines no animations")]
    NoAnimations(PathBuf),

    #[error("no animation named '{name}' in '{path}'")]
    AnimationNotFound { path: PathBuf, name: String },

    #[error("'{0}' defines no skin")]
    NoSkin(PathBuf),

    #[error("skin in '{0}' has no joints")]
    EmptySkin(PathBuf),

    #[error("clip '{clip}' in '{path}' cannot be sampled")]
    ClipTooLong {
        path: PathBuf,
        clip: String,
        #[source]
        source: ClockError,
    },

    #[error("palette of {joint_count} joints over {frame_count} frames for '{path}' exceeds {limit} floats")]
    PaletteTooLarge {
        path: PathBuf,
        joint_count: usize,
        frame_count: usize,
        limit: usize,
    },

    #[error("invalid asset configuration: {0}")]
    Config(String),
}

impl AssetError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        AssetError::Io(path.into(), Arc::new(err))
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, source: DecodeError) -> Self {
        AssetError::Decode {
            path: path.into(),
            source,
        }
    }

    /// True when a decoder read would have run past the end of its buffer.
    pub fn is_bounds_error(&self) -> bool {
        matches!(
            self,
            AssetError::Decode {
                source: DecodeError::OutOfBounds { .. },
                ..
            }
        )
    }
}
