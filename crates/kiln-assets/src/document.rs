//! Loaded glTF document plus its buffer payloads.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::decode::{self, Accessor, BufferView, DecodeError};
use crate::error::AssetError;

/// A parsed glTF 2.0 file (.gltf or .glb) with all buffers resolved.
///
/// External buffer URIs are resolved relative to the file's directory; data
/// URIs and the GLB binary chunk are embedded. Images are never decoded.
pub struct Model {
    path: PathBuf,
    document: gltf::Document,
    buffers: Vec<gltf::buffer::Data>,
}

impl Model {
    /// Parse a glTF file and load every buffer it references.
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        if !path.is_file() {
            return Err(AssetError::NotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|e| AssetError::io(path, e))?;
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice_without_validation(&bytes)
            .map_err(|e| AssetError::GltfLoadFailed(path.to_path_buf(), e.to_string()))?;
        let json = document.into_json();
        validate_structure(&json)
            .map_err(|reason| AssetError::GltfLoadFailed(path.to_path_buf(), reason))?;
        let document = gltf::Document::from_json_without_validation(json);

        let base = path.parent();
        let buffers = gltf::import_buffers(&document, base, blob)
            .map_err(|e| AssetError::GltfLoadFailed(path.to_path_buf(), e.to_string()))?;

        debug!(
            "Parsed '{}': {} meshes, {} nodes, {} skins, {} animations",
            path.display(),
            document.meshes().count(),
            document.nodes().count(),
            document.skins().count(),
            document.animations().count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            document,
            buffers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &gltf::Document {
        &self.document
    }

    /// Describe an accessor and locate its backing buffer.
    fn describe<'a>(&'a self, accessor: &gltf::Accessor) -> Result<(&'a [u8], BufferView, Accessor), DecodeError> {
        let view = accessor.view().ok_or(DecodeError::MissingView)?;
        let buffer_index = view.buffer().index();
        let buffer = self
            .buffers
            .get(buffer_index)
            .ok_or(DecodeError::MissingBuffer(buffer_index))?;

        let view_desc = BufferView {
            buffer: buffer_index,
            offset: view.offset(),
            length: view.length(),
            stride: view.stride(),
        };
        let accessor_desc = Accessor {
            component: accessor.data_type().into(),
            shape: accessor.dimensions().into(),
            normalized: accessor.normalized(),
            count: accessor.count(),
            offset: accessor.offset(),
            view: Some(view.index()),
        };
        Ok((&buffer[..], view_desc, accessor_desc))
    }

    fn wrap<T>(&self, result: Result<T, DecodeError>) -> Result<T, AssetError> {
        result.map_err(|e| AssetError::decode(&self.path, e))
    }

    pub fn read_floats<const N: usize>(&self, accessor: &gltf::Accessor) -> Result<Vec<[f32; N]>, AssetError> {
        self.wrap(
            self.describe(accessor)
                .and_then(|(bytes, view, desc)| decode::read_floats::<N>(bytes, &view, &desc)),
        )
    }

    pub fn read_uints<const N: usize>(&self, accessor: &gltf::Accessor) -> Result<Vec<[u32; N]>, AssetError> {
        self.wrap(
            self.describe(accessor)
                .and_then(|(bytes, view, desc)| decode::read_uints::<N>(bytes, &view, &desc)),
        )
    }

    pub fn read_scalars(&self, accessor: &gltf::Accessor) -> Result<Vec<f32>, AssetError> {
        self.wrap(
            self.describe(accessor)
                .and_then(|(bytes, view, desc)| decode::read_scalars(bytes, &view, &desc)),
        )
    }

    pub fn read_indices(&self, accessor: &gltf::Accessor) -> Result<Vec<u32>, AssetError> {
        self.wrap(
            self.describe(accessor)
                .and_then(|(bytes, view, desc)| decode::read_indices(bytes, &view, &desc)),
        )
    }

    pub fn read_matrices(&self, accessor: &gltf::Accessor) -> Result<Vec<[f32; 16]>, AssetError> {
        self.wrap(
            self.describe(accessor)
                .and_then(|(bytes, view, desc)| decode::read_matrices(bytes, &view, &desc)),
        )
    }
}

/// Run glTF's own validation, keeping only the structural failures.
///
/// A primitive without POSITION and a POSITION accessor without `min`/`max`
/// are left to the extractor, which reports the first as
/// [`AssetError::MissingPosition`] and never needs the second.
fn validate_structure(root: &gltf::json::Root) -> Result<(), String> {
    use gltf::json::validation::Validate;

    // The POSITION bounds check indexes the accessor list without a guard.
    for (m, mesh) in root.meshes.iter().enumerate() {
        for (p, primitive) in mesh.primitives.iter().enumerate() {
            if let Some(index) = primitive
                .attributes
                .values()
                .map(|accessor| accessor.value())
                .find(|&index| index >= root.accessors.len())
            {
                return Err(format!(
                    "meshes[{m}].primitives[{p}].attributes: accessor {index} out of bounds"
                ));
            }
        }
    }

    let mut errors = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        if !is_content_check(path.as_str(), error) {
            errors.push(format!("{}: {}", path, error));
        }
    });
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn is_content_check(path: &str, error: gltf::json::validation::Error) -> bool {
    error == gltf::json::validation::Error::Missing
        && (path.ends_with("[\"POSITION\"]")
            || path.ends_with("[\"POSITION\"].min")
            || path.ends_with("[\"POSITION\"].max"))
}
