//! Kiln Assets - glTF ingestion for the kiln asset pipeline
//!
//! Turns glTF 2.0 files into flat, non-indexed vertex streams backed by a
//! persistent mesh cache, and bakes skeletal animation clips into per-frame
//! skinning matrix palettes.

mod animation;
mod cache;
mod config;
pub mod decode;
mod document;
mod error;
mod gltf_loader;
pub mod hierarchy;
mod mesh;
mod server;
mod skin;

pub use animation::{
    index_clips, index_model, AnimationIndex, AnimationSet, ClipInfo, DEFAULT_CLIP_NAME,
};
pub use cache::{
    read_record, write_record, CacheKey, MeshCache, MESH_CACHE_MAGIC, MESH_CACHE_VERSION,
};
pub use config::{AssetConfig, CacheConfig};
pub use decode::DecodeError;
pub use document::Model;
pub use error::AssetError;
pub use gltf_loader::{
    extract_from_model, extract_mesh, flat_normals, recenter_unit_cube, split_selector,
    SELECTOR_SEPARATOR,
};
pub use hierarchy::{canonical_name, NodeHierarchy, NodeNameLookup};
pub use mesh::{MeshData, DEFAULT_JOINTS, DEFAULT_WEIGHTS};
pub use server::AssetServer;
pub use skin::{
    bake_from_models, bake_skinning, BakeReport, BakedSkinningFrames, MATRIX_FLOATS,
    MAX_PALETTE_FLOATS,
};
