mod common;

use std::fs;
use std::path::Path;

use common::{primitive, GltfBuilder};
use kiln_assets::{
    read_record, write_record, AssetConfig, AssetServer, CacheKey, MeshCache, MeshData,
    MESH_CACHE_MAGIC,
};

fn triangle_file(dir: &Path, x: f32) -> std::path::PathBuf {
    let mut builder = GltfBuilder::new();
    let positions = builder.vec3(&[[x, 0.0, 0.0], [x + 4.0, 0.0, 0.0], [x, 4.0, 0.0]]);
    let uvs = builder.vec2(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
    builder.mesh(
        "Tri",
        vec![primitive(&[("POSITION", positions), ("TEXCOORD_0", uvs)], None)],
    );
    builder.write_gltf(dir, "tri")
}

fn server(assets: &Path, cache: &Path, memory: bool) -> AssetServer {
    let mut config = AssetConfig::with_base_path(assets);
    config.cache.directory = Some(cache.to_path_buf());
    config.cache.memory = memory;
    AssetServer::with_config(config)
}

fn cache_files(cache: &Path) -> Vec<std::path::PathBuf> {
    match fs::read_dir(cache) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn first_load_writes_a_record() {
    common::init_tracing();
    let assets = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let cache_dir = cache.path().join("nested/meshes");
    triangle_file(assets.path(), 10.0);

    let mesh = server(assets.path(), &cache_dir, true).load_mesh("tri.gltf").unwrap();
    assert_eq!(mesh.vertex_count(), 3);

    let files = cache_files(&cache_dir);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("mesh"));
    let bytes = fs::read(&files[0]).unwrap();
    assert_eq!(bytes[..4], MESH_CACHE_MAGIC.to_le_bytes());
    assert_eq!(read_record(&bytes).unwrap(), Some(mesh));
}

#[test]
fn cached_record_is_served_without_reextracting() {
    let assets = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    triangle_file(assets.path(), 10.0);

    let original = server(assets.path(), cache.path(), false).load_mesh("tri.gltf").unwrap();

    // Rewrite the source; a fresh server still sees the cached geometry
    // because entries are keyed by path, not content.
    triangle_file(assets.path(), 20.0);
    let reloaded = server(assets.path(), cache.path(), false).load_mesh("tri.gltf").unwrap();
    assert_eq!(reloaded, original);
}

#[test]
fn selectors_get_their_own_entries() {
    let assets = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    triangle_file(assets.path(), 10.0);

    let server = server(assets.path(), cache.path(), true);
    server.load_mesh("tri.gltf").unwrap();
    server.load_mesh("tri.gltf#Tri").unwrap();
    assert_eq!(cache_files(cache.path()).len(), 2);
}

#[test]
fn corrupt_record_falls_back_to_extraction() {
    common::init_tracing();
    let assets = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    triangle_file(assets.path(), 10.0);

    let expected = server(assets.path(), cache.path(), false).load_mesh("tri.gltf").unwrap();
    let record = cache_files(cache.path()).remove(0);
    let bytes = fs::read(&record).unwrap();
    fs::write(&record, &bytes[..bytes.len() / 2]).unwrap();

    let mesh = server(assets.path(), cache.path(), false).load_mesh("tri.gltf").unwrap();
    assert_eq!(mesh, expected);
    // The entry was rewritten whole.
    assert_eq!(fs::read(&record).unwrap(), bytes);
}

#[test]
fn stale_version_is_a_miss() {
    let cache = tempfile::tempdir().unwrap();
    let store = MeshCache::with_memory(cache.path(), false);
    let key = CacheKey::for_path("/assets/tri.gltf");
    let mesh = MeshData {
        positions: vec![[0.0; 3]; 3],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        joints: vec![[0; 4]; 3],
        weights: vec![[1.0, 0.0, 0.0, 0.0]; 3],
        ..Default::default()
    };
    store.put(key, &mesh).unwrap();
    assert_eq!(store.get(key), Some(mesh));

    let path = store.path_for(key);
    let mut bytes = fs::read(&path).unwrap();
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    fs::write(&path, bytes).unwrap();
    assert_eq!(store.get(key), None);
}

#[test]
fn record_round_trip_is_bit_exact() {
    let mesh = MeshData {
        positions: vec![[0.1, -0.0, f32::MIN_POSITIVE], [1e-30, 3.5, -7.25], [f32::MAX, 0.3, 0.7]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        uvs: vec![[0.25, 0.75]; 3],
        colors: vec![[0.1, 0.2, 0.3, 1.0]; 3],
        joints: vec![[1, 2, 3, 70_000]; 3],
        weights: vec![[0.4, 0.3, 0.2, 0.1]; 3],
    };
    let mut bytes = Vec::new();
    write_record(&mut bytes, &mesh).unwrap();
    let decoded = read_record(&bytes).unwrap().unwrap();

    let bits = |m: &MeshData| -> Vec<u32> {
        m.positions
            .iter()
            .flatten()
            .chain(m.normals.iter().flatten())
            .chain(m.uvs.iter().flatten())
            .chain(m.colors.iter().flatten())
            .chain(m.weights.iter().flatten())
            .map(|f| f.to_bits())
            .collect()
    };
    assert_eq!(bits(&decoded), bits(&mesh));
    assert_eq!(decoded.joints, mesh.joints);
}

#[test]
fn disabled_cache_writes_nothing() {
    let assets = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    triangle_file(assets.path(), 10.0);

    let mut config = AssetConfig::with_base_path(assets.path());
    config.cache.enabled = false;
    config.cache.directory = Some(cache.path().to_path_buf());
    let server = AssetServer::with_config(config);

    server.load_mesh("tri.gltf").unwrap();
    assert!(cache_files(cache.path()).is_empty());
}
