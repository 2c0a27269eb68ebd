//! Mesh extraction: selects meshes from a glTF file and flattens their
//! primitives into a single non-indexed triangle list.

use std::path::Path;

use glam::Vec3;
use tracing::{debug, warn};

use crate::document::Model;
use crate::error::AssetError;
use crate::mesh::{MeshData, DEFAULT_JOINTS, DEFAULT_WEIGHTS};

/// Separator between a file path and its mesh selectors.
pub const SELECTOR_SEPARATOR: char = '#';

/// Cross products shorter than this are treated as degenerate triangles.
const DEGENERATE_NORMAL_LENGTH: f32 = 1e-6;

/// Tolerance around the unit cube used to detect origin-cornered assets.
const UNIT_CUBE_EPSILON: f32 = 0.001;

/// Split `path#sel1#sel2` into the file path and its non-empty selectors.
///
/// An absent or empty selector list means "all meshes in the file".
pub fn split_selector(path: &str) -> (&str, Vec<&str>) {
    match path.split_once(SELECTOR_SEPARATOR) {
        Some((file, rest)) => {
            let selectors = rest
                .split(SELECTOR_SEPARATOR)
                .filter(|s| !s.is_empty())
                .collect();
            (file, selectors)
        }
        None => (path, Vec::new()),
    }
}

/// Load a glTF file and extract the selected meshes.
pub fn extract_mesh<S: AsRef<str>>(path: &Path, selectors: &[S]) -> Result<MeshData, AssetError> {
    let model = Model::open(path)?;
    extract_from_model(&model, selectors)
}

/// Extract the selected meshes from an already loaded model.
///
/// Each selector matches a mesh name exactly, falling back to the name of a
/// node that references a mesh. Meshes are concatenated in selector order, or
/// in file order when no selector is given.
pub fn extract_from_model<S: AsRef<str>>(model: &Model, selectors: &[S]) -> Result<MeshData, AssetError> {
    let meshes = resolve_meshes(model, selectors)?;

    let mut streams = Vec::new();
    let mut saw_position = false;
    for mesh in &meshes {
        for primitive in mesh.primitives() {
            if let Some(stream) = expand_primitive(model, &primitive)? {
                saw_position = true;
                streams.push(stream);
            } else if primitive.get(&gltf::Semantic::Positions).is_some() {
                saw_position = true;
            }
        }
    }

    if !saw_position {
        return Err(AssetError::MissingPosition(model.path().to_path_buf()));
    }

    let mut data = concatenate(streams);
    if recenter_unit_cube(&mut data.positions) {
        debug!("Recentered unit-cube mesh from '{}'", model.path().display());
    }

    debug!(
        "Extracted {} vertices from {} meshes in '{}'",
        data.vertex_count(),
        meshes.len(),
        model.path().display()
    );
    Ok(data)
}

fn resolve_meshes<'a, S: AsRef<str>>(
    model: &'a Model,
    selectors: &[S],
) -> Result<Vec<gltf::Mesh<'a>>, AssetError> {
    let document = model.document();
    if selectors.is_empty() {
        return Ok(document.meshes().collect());
    }

    selectors
        .iter()
        .map(|selector| {
            let selector = selector.as_ref();
            document
                .meshes()
                .find(|mesh| mesh.name() == Some(selector))
                .or_else(|| {
                    document
                        .nodes()
                        .filter(|node| node.name() == Some(selector))
                        .find_map(|node| node.mesh())
                })
                .ok_or_else(|| AssetError::MeshNotFound {
                    path: model.path().to_path_buf(),
                    selector: selector.to_string(),
                })
        })
        .collect()
}

/// One primitive expanded to a triangle list.
struct PrimitiveStream {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Option<Vec<[f32; 2]>>,
    colors: Option<Vec<[f32; 4]>>,
    joints: Vec<[u32; 4]>,
    weights: Vec<[f32; 4]>,
}

/// Read an optional attribute, dropping it when its count disagrees with the
/// position count.
fn optional_attribute<T>(
    model: &Model,
    name: &str,
    values: Option<Result<Vec<T>, AssetError>>,
    vertex_count: usize,
) -> Result<Option<Vec<T>>, AssetError> {
    match values.transpose()? {
        Some(values) if values.len() != vertex_count => {
            warn!(
                "Ignoring {} in '{}': {} values for {} vertices",
                name,
                model.path().display(),
                values.len(),
                vertex_count
            );
            Ok(None)
        }
        other => Ok(other),
    }
}

fn read_colors(model: &Model, accessor: &gltf::Accessor) -> Result<Vec<[f32; 4]>, AssetError> {
    if accessor.dimensions() == gltf::accessor::Dimensions::Vec3 {
        Ok(model
            .read_floats::<3>(accessor)?
            .into_iter()
            .map(|[r, g, b]| [r, g, b, 1.0])
            .collect())
    } else {
        model.read_floats::<4>(accessor)
    }
}

/// Triangle-list indices for a primitive, or `None` for non-triangle topologies.
fn triangle_indices(model: &Model, primitive: &gltf::Primitive, vertex_count: usize) -> Result<Option<Vec<u32>>, AssetError> {
    use gltf::mesh::Mode;

    let mut raw: Vec<u32> = match primitive.indices() {
        Some(accessor) => model.read_indices(&accessor)?,
        None => (0..vertex_count as u32).collect(),
    };

    let triangles = match primitive.mode() {
        Mode::Triangles => {
            let whole = raw.len() - raw.len() % 3;
            if whole != raw.len() {
                warn!(
                    "Dropping {} trailing indices in '{}'",
                    raw.len() - whole,
                    model.path().display()
                );
            }
            raw.truncate(whole);
            raw
        }
        Mode::TriangleStrip => {
            let mut out = Vec::with_capacity(raw.len().saturating_sub(2) * 3);
            for i in 0..raw.len().saturating_sub(2) {
                if i % 2 == 0 {
                    out.extend_from_slice(&[raw[i], raw[i + 1], raw[i + 2]]);
                } else {
                    out.extend_from_slice(&[raw[i + 1], raw[i], raw[i + 2]]);
                }
            }
            out
        }
        Mode::TriangleFan => {
            let mut out = Vec::with_capacity(raw.len().saturating_sub(2) * 3);
            for i in 1..raw.len().saturating_sub(1) {
                out.extend_from_slice(&[raw[0], raw[i], raw[i + 1]]);
            }
            out
        }
        other => {
            warn!(
                "Skipping {:?} primitive in '{}': only triangles are supported",
                other,
                model.path().display()
            );
            return Ok(None);
        }
    };

    if let Some(&index) = triangles.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(AssetError::IndexOutOfRange {
            path: model.path().to_path_buf(),
            index,
            vertex_count,
        });
    }
    Ok(Some(triangles))
}

fn gather<T: Copy>(values: &[T], indices: &[u32]) -> Vec<T> {
    indices.iter().map(|&i| values[i as usize]).collect()
}

fn expand_primitive(model: &Model, primitive: &gltf::Primitive) -> Result<Option<PrimitiveStream>, AssetError> {
    use gltf::Semantic;

    let Some(position_accessor) = primitive.get(&Semantic::Positions) else {
        debug!("Primitive without POSITION in '{}'", model.path().display());
        return Ok(None);
    };
    let positions = model.read_floats::<3>(&position_accessor)?;
    let count = positions.len();

    let Some(indices) = triangle_indices(model, primitive, count)? else {
        return Ok(None);
    };

    let normals = optional_attribute(
        model,
        "NORMAL",
        primitive.get(&Semantic::Normals).map(|a| model.read_floats::<3>(&a)),
        count,
    )?;
    let uvs = optional_attribute(
        model,
        "TEXCOORD_0",
        primitive.get(&Semantic::TexCoords(0)).map(|a| model.read_floats::<2>(&a)),
        count,
    )?;
    let colors = optional_attribute(
        model,
        "COLOR_0",
        primitive.get(&Semantic::Colors(0)).map(|a| read_colors(model, &a)),
        count,
    )?;
    let joints = optional_attribute(
        model,
        "JOINTS_0",
        primitive.get(&Semantic::Joints(0)).map(|a| model.read_uints::<4>(&a)),
        count,
    )?;
    let weights = optional_attribute(
        model,
        "WEIGHTS_0",
        primitive.get(&Semantic::Weights(0)).map(|a| model.read_floats::<4>(&a)),
        count,
    )?;

    let out_positions = gather(&positions, &indices);
    let out_normals = match normals {
        Some(normals) => gather(&normals, &indices),
        None => flat_normals(&out_positions),
    };

    let (out_joints, out_weights) = match (joints, weights) {
        (Some(joints), Some(weights)) => (gather(&joints, &indices), gather(&weights, &indices)),
        _ => (
            vec![DEFAULT_JOINTS; indices.len()],
            vec![DEFAULT_WEIGHTS; indices.len()],
        ),
    };

    Ok(Some(PrimitiveStream {
        positions: out_positions,
        normals: out_normals,
        uvs: uvs.map(|uvs| gather(&uvs, &indices)),
        colors: colors.map(|colors| gather(&colors, &indices)),
        joints: out_joints,
        weights: out_weights,
    }))
}

/// Concatenate primitive streams, padding UVs and colors for primitives that
/// lack them whenever any primitive supplies them.
fn concatenate(streams: Vec<PrimitiveStream>) -> MeshData {
    let any_uv = streams.iter().any(|s| s.uvs.is_some());
    let any_color = streams.iter().any(|s| s.colors.is_some());

    let mut data = MeshData::default();
    for stream in streams {
        let count = stream.positions.len();
        if any_uv {
            data.uvs
                .extend(stream.uvs.unwrap_or_else(|| vec![[0.0, 0.0]; count]));
        }
        if any_color {
            data.colors
                .extend(stream.colors.unwrap_or_else(|| vec![[1.0, 1.0, 1.0, 1.0]; count]));
        }
        data.positions.extend(stream.positions);
        data.normals.extend(stream.normals);
        data.joints.extend(stream.joints);
        data.weights.extend(stream.weights);
    }
    data
}

/// Flat per-triangle normals from the cross product of the first two edges.
///
/// Degenerate triangles keep a zero normal.
pub fn flat_normals(positions: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0; 3]; positions.len()];
    for (tri, out) in positions.chunks_exact(3).zip(normals.chunks_exact_mut(3)) {
        let p0 = Vec3::from_array(tri[0]);
        let p1 = Vec3::from_array(tri[1]);
        let p2 = Vec3::from_array(tri[2]);
        let cross = (p1 - p0).cross(p2 - p0);
        let length = cross.length();
        let normal = if length > DEGENERATE_NORMAL_LENGTH {
            (cross / length).to_array()
        } else {
            [0.0; 3]
        };
        out.fill(normal);
    }
    normals
}

/// Shift positions by -0.5 on every axis when the mesh sits inside the unit
/// cube at the origin. Returns whether the mesh was moved.
pub fn recenter_unit_cube(positions: &mut [[f32; 3]]) -> bool {
    if positions.is_empty() {
        return false;
    }

    let inside = positions.iter().all(|p| {
        p.iter()
            .all(|&c| (-UNIT_CUBE_EPSILON..=1.0 + UNIT_CUBE_EPSILON).contains(&c))
    });
    if !inside {
        return false;
    }

    for p in positions.iter_mut() {
        for c in p.iter_mut() {
            *c -= 0.5;
        }
    }
    true
}
