//! Programmatic glTF fixtures: JSON built with serde_json, buffer data packed
//! little-endian, written as `.gltf` + `.bin` or as a single `.glb`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use glam::Mat4;
use serde_json::{json, Value};

pub const FLOAT: u32 = 5126;
pub const UNSIGNED_BYTE: u32 = 5121;
pub const UNSIGNED_SHORT: u32 = 5123;
pub const UNSIGNED_INT: u32 = 5125;

#[derive(Default)]
pub struct GltfBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
    meshes: Vec<Value>,
    nodes: Vec<Value>,
    skins: Vec<Value>,
    animations: Vec<Value>,
}

impl GltfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes as a new buffer view, 4-byte aligned.
    pub fn view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
        }));
        self.views.len() - 1
    }

    /// Accessor over an existing view, with no consistency checks.
    pub fn accessor(&mut self, view: usize, component: u32, kind: &str, count: usize) -> usize {
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": component,
            "type": kind,
            "count": count,
        }));
        self.accessors.len() - 1
    }

    pub fn set_bounds(&mut self, accessor: usize, min: Vec<f32>, max: Vec<f32>) {
        self.accessors[accessor]["min"] = json!(min);
        self.accessors[accessor]["max"] = json!(max);
    }

    pub fn vec3(&mut self, data: &[[f32; 3]]) -> usize {
        let view = self.view(&floats(data.iter().flatten()));
        let accessor = self.accessor(view, FLOAT, "VEC3", data.len());
        let mut min = vec![f32::MAX; 3];
        let mut max = vec![f32::MIN; 3];
        for v in data {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        self.set_bounds(accessor, min, max);
        accessor
    }

    pub fn vec2(&mut self, data: &[[f32; 2]]) -> usize {
        let view = self.view(&floats(data.iter().flatten()));
        self.accessor(view, FLOAT, "VEC2", data.len())
    }

    pub fn vec4(&mut self, data: &[[f32; 4]]) -> usize {
        let view = self.view(&floats(data.iter().flatten()));
        self.accessor(view, FLOAT, "VEC4", data.len())
    }

    /// Keyframe times.
    pub fn scalars(&mut self, data: &[f32]) -> usize {
        let view = self.view(&floats(data.iter()));
        let accessor = self.accessor(view, FLOAT, "SCALAR", data.len());
        let min = data.iter().copied().fold(f32::MAX, f32::min);
        let max = data.iter().copied().fold(f32::MIN, f32::max);
        self.set_bounds(accessor, vec![min], vec![max]);
        accessor
    }

    pub fn mat4s(&mut self, data: &[Mat4]) -> usize {
        let view = self.view(&floats(data.iter().flat_map(|m| m.to_cols_array())));
        self.accessor(view, FLOAT, "MAT4", data.len())
    }

    pub fn indices_u16(&mut self, data: &[u16]) -> usize {
        let bytes: Vec<u8> = data.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.view(&bytes);
        self.accessor(view, UNSIGNED_SHORT, "SCALAR", data.len())
    }

    pub fn joints_u8(&mut self, data: &[[u8; 4]]) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().copied().collect();
        let view = self.view(&bytes);
        self.accessor(view, UNSIGNED_BYTE, "VEC4", data.len())
    }

    pub fn mesh(&mut self, name: &str, primitives: Vec<Value>) -> usize {
        self.meshes.push(json!({ "name": name, "primitives": primitives }));
        self.meshes.len() - 1
    }

    pub fn node(&mut self, node: Value) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn skin(&mut self, joints: &[usize], inverse_binds: Option<usize>) -> usize {
        let mut skin = json!({ "joints": joints });
        if let Some(accessor) = inverse_binds {
            skin["inverseBindMatrices"] = json!(accessor);
        }
        self.skins.push(skin);
        self.skins.len() - 1
    }

    /// Add a clip; each channel is `(node, path, times accessor, values accessor)`.
    pub fn animation(&mut self, name: Option<&str>, channels: &[(usize, &str, usize, usize)]) -> usize {
        self.animation_with(name, "LINEAR", channels)
    }

    /// Add a clip whose samplers all use `interpolation`.
    pub fn animation_with(
        &mut self,
        name: Option<&str>,
        interpolation: &str,
        channels: &[(usize, &str, usize, usize)],
    ) -> usize {
        let samplers: Vec<Value> = channels
            .iter()
            .map(|&(_, _, input, output)| {
                json!({ "input": input, "output": output, "interpolation": interpolation })
            })
            .collect();
        let targets: Vec<Value> = channels
            .iter()
            .enumerate()
            .map(|(sampler, &(node, path, _, _))| {
                json!({ "sampler": sampler, "target": { "node": node, "path": path } })
            })
            .collect();
        let mut animation = json!({ "channels": targets, "samplers": samplers });
        if let Some(name) = name {
            animation["name"] = json!(name);
        }
        self.animations.push(animation);
        self.animations.len() - 1
    }

    fn root(&self, buffer: Value) -> Value {
        let mut root = json!({
            "asset": { "version": "2.0", "generator": "kiln tests" },
            "buffers": [buffer],
            "bufferViews": self.views,
            "accessors": self.accessors,
        });
        for (key, items) in [
            ("meshes", &self.meshes),
            ("nodes", &self.nodes),
            ("skins", &self.skins),
            ("animations", &self.animations),
        ] {
            if !items.is_empty() {
                root[key] = json!(items);
            }
        }
        if !self.nodes.is_empty() {
            root["scenes"] = json!([{ "nodes": [0] }]);
            root["scene"] = json!(0);
        }
        root
    }

    /// Write `<name>.gltf` with a sidecar `<name>.bin`.
    pub fn write_gltf(&self, dir: &Path, name: &str) -> PathBuf {
        let bin_name = format!("{name}.bin");
        fs::write(dir.join(&bin_name), &self.bin).unwrap();
        let root = self.root(json!({ "byteLength": self.bin.len(), "uri": bin_name }));
        let path = dir.join(format!("{name}.gltf"));
        fs::write(&path, serde_json::to_vec_pretty(&root).unwrap()).unwrap();
        path
    }

    /// Write `<name>.glb` with the buffer in the BIN chunk.
    pub fn write_glb(&self, dir: &Path, name: &str) -> PathBuf {
        let root = self.root(json!({ "byteLength": self.bin.len() }));
        let mut json_bytes = serde_json::to_vec(&root).unwrap();
        while json_bytes.len() % 4 != 0 {
            json_bytes.push(b' ');
        }
        let mut bin = self.bin.clone();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
        glb.extend_from_slice(&json_bytes);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        glb.extend_from_slice(&bin);

        let path = dir.join(format!("{name}.glb"));
        fs::write(&path, glb).unwrap();
        path
    }
}

fn floats(values: impl IntoIterator<Item = impl std::borrow::Borrow<f32>>) -> Vec<u8> {
    values
        .into_iter()
        .flat_map(|v| v.borrow().to_le_bytes())
        .collect()
}

/// Primitive JSON with the given attribute accessors.
pub fn primitive(attributes: &[(&str, usize)], indices: Option<usize>) -> Value {
    let attributes: serde_json::Map<String, Value> = attributes
        .iter()
        .map(|&(name, accessor)| (name.to_string(), json!(accessor)))
        .collect();
    let mut primitive = json!({ "attributes": attributes });
    if let Some(indices) = indices {
        primitive["indices"] = json!(indices);
    }
    primitive
}

pub fn assert_mat4_near(actual: Mat4, expected: Mat4) {
    assert!(
        actual.abs_diff_eq(expected, 1e-5),
        "expected {expected:?}, got {actual:?}"
    );
}

/// Route library logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
