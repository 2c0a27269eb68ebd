//! Content-addressed on-disk cache for extracted meshes.
//!
//! Record layout (little-endian):
//!
//! ```text
//! [magic:u32][version:u32][has_uv:u32]
//! [positions][normals][uvs][colors][joints][weights]
//! ```
//!
//! Each array field is `[count:u32]` followed by `count` scalars (`f32`, or
//! `u32` for joints). A record whose magic or version differs from the
//! current constants is a miss, so bumping [`MESH_CACHE_VERSION`] invalidates
//! every existing entry.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::AssetError;
use crate::mesh::MeshData;

/// "MESH" read as a little-endian u32.
pub const MESH_CACHE_MAGIC: u32 = 0x4853_454D;
pub const MESH_CACHE_VERSION: u32 = 1;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hash.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// Cache key derived from a resolved asset path (selector included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn for_path(resolved: &str) -> Self {
        Self(fnv1a64(resolved.as_bytes()))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn file_name(&self) -> String {
        format!("{:016x}.mesh", self.0)
    }
}

/// Create `dir` one segment at a time, treating "already exists" as success.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }
        match fs::create_dir(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn write_f32s<W: Write, const N: usize>(w: &mut W, values: &[[f32; N]]) -> io::Result<()> {
    w.write_u32::<LittleEndian>((values.len() * N) as u32)?;
    for &v in values.iter().flatten() {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn write_u32s<W: Write, const N: usize>(w: &mut W, values: &[[u32; N]]) -> io::Result<()> {
    w.write_u32::<LittleEndian>((values.len() * N) as u32)?;
    for &v in values.iter().flatten() {
        w.write_u32::<LittleEndian>(v)?;
    }
    Ok(())
}

/// Serialize a mesh record.
pub fn write_record<W: Write>(w: &mut W, mesh: &MeshData) -> io::Result<()> {
    w.write_u32::<LittleEndian>(MESH_CACHE_MAGIC)?;
    w.write_u32::<LittleEndian>(MESH_CACHE_VERSION)?;
    w.write_u32::<LittleEndian>(mesh.has_uv() as u32)?;
    write_f32s(w, &mesh.positions)?;
    write_f32s(w, &mesh.normals)?;
    write_f32s(w, &mesh.uvs)?;
    write_f32s(w, &mesh.colors)?;
    write_u32s(w, &mesh.joints)?;
    write_f32s(w, &mesh.weights)?;
    Ok(())
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Read an array length and make sure the payload can actually be present.
fn read_count(r: &mut &[u8]) -> io::Result<usize> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    if count.saturating_mul(4) > r.len() {
        return Err(invalid(format!(
            "array of {} values exceeds remaining {} bytes",
            count,
            r.len()
        )));
    }
    Ok(count)
}

fn read_f32_array<const N: usize>(r: &mut &[u8]) -> io::Result<Vec<[f32; N]>> {
    let count = read_count(r)?;
    if count % N != 0 {
        return Err(invalid(format!("{} floats do not form {}-wide elements", count, N)));
    }
    let mut flat = vec![0.0f32; count];
    r.read_f32_into::<LittleEndian>(&mut flat)?;
    Ok(flat
        .chunks_exact(N)
        .map(|chunk| std::array::from_fn(|i| chunk[i]))
        .collect())
}

fn read_u32_array<const N: usize>(r: &mut &[u8]) -> io::Result<Vec<[u32; N]>> {
    let count = read_count(r)?;
    if count % N != 0 {
        return Err(invalid(format!("{} values do not form {}-wide elements", count, N)));
    }
    let mut flat = vec![0u32; count];
    r.read_u32_into::<LittleEndian>(&mut flat)?;
    Ok(flat
        .chunks_exact(N)
        .map(|chunk| std::array::from_fn(|i| chunk[i]))
        .collect())
}

/// Parse a mesh record. Returns `Ok(None)` when the header belongs to a
/// different format or version.
pub fn read_record(bytes: &[u8]) -> io::Result<Option<MeshData>> {
    let mut r = bytes;
    let magic = r.read_u32::<LittleEndian>()?;
    let version = r.read_u32::<LittleEndian>()?;
    if magic != MESH_CACHE_MAGIC || version != MESH_CACHE_VERSION {
        return Ok(None);
    }
    let has_uv = r.read_u32::<LittleEndian>()? != 0;

    let positions = read_f32_array::<3>(&mut r)?;
    let normals = read_f32_array::<3>(&mut r)?;
    let uvs = read_f32_array::<2>(&mut r)?;
    let colors = read_f32_array::<4>(&mut r)?;
    let joints = read_u32_array::<4>(&mut r)?;
    let weights = read_f32_array::<4>(&mut r)?;

    let mesh = MeshData {
        positions,
        normals,
        uvs: if has_uv { uvs } else { Vec::new() },
        colors,
        joints,
        weights,
    };
    mesh.validate().map_err(invalid)?;
    Ok(Some(mesh))
}

/// Persistent mesh store with an optional in-memory layer in front of it.
pub struct MeshCache {
    dir: PathBuf,
    memory: Option<Mutex<HashMap<CacheKey, Arc<MeshData>>>>,
}

impl MeshCache {
    /// Cache rooted at `dir` with the in-memory layer enabled.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_memory(dir, true)
    }

    pub fn with_memory(dir: impl Into<PathBuf>, memory: bool) -> Self {
        Self {
            dir: dir.into(),
            memory: memory.then(|| Mutex::new(HashMap::new())),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// File that stores the record for `key`.
    pub fn path_for(&self, key: CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Look up a mesh. Missing, stale and corrupt records are all misses.
    pub fn get(&self, key: CacheKey) -> Option<MeshData> {
        if let Some(memory) = &self.memory {
            if let Some(mesh) = memory.lock().get(&key) {
                return Some(MeshData::clone(mesh));
            }
        }

        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to read mesh cache '{}': {}", path.display(), e);
                }
                return None;
            }
        };

        match read_record(&bytes) {
            Ok(Some(mesh)) => {
                debug!("Mesh cache hit '{}'", path.display());
                if let Some(memory) = &self.memory {
                    memory.lock().insert(key, Arc::new(mesh.clone()));
                }
                Some(mesh)
            }
            Ok(None) => {
                debug!("Stale mesh cache entry '{}'", path.display());
                None
            }
            Err(e) => {
                warn!("Corrupt mesh cache entry '{}': {}", path.display(), e);
                None
            }
        }
    }

    /// Store a mesh. The record is written to a temporary file and renamed
    /// into place; failures leave any previous entry untouched.
    pub fn put(&self, key: CacheKey, mesh: &MeshData) -> Result<(), AssetError> {
        if let Some(memory) = &self.memory {
            memory.lock().insert(key, Arc::new(mesh.clone()));
        }

        ensure_dir(&self.dir).map_err(|e| AssetError::io(&self.dir, e))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("mesh.tmp");

        let write = || -> io::Result<()> {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            write_record(&mut writer, mesh)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            // Best effort: the temporary file may not exist.
            let _ = fs::remove_file(&tmp);
            return Err(AssetError::io(path, e));
        }

        debug!("Wrote mesh cache '{}'", path.display());
        Ok(())
    }

    /// Drop an entry from both layers.
    pub fn remove(&self, key: CacheKey) -> bool {
        let in_memory = self
            .memory
            .as_ref()
            .is_some_and(|memory| memory.lock().remove(&key).is_some());
        let on_disk = fs::remove_file(self.path_for(key)).is_ok();
        in_memory || on_disk
    }

    pub fn clear_memory(&self) {
        if let Some(memory) = &self.memory {
            memory.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{DEFAULT_JOINTS, DEFAULT_WEIGHTS};

    fn sample_mesh() -> MeshData {
        MeshData {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, f32::MIN_POSITIVE]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            colors: Vec::new(),
            joints: vec![DEFAULT_JOINTS, [1, 2, 0, 0], DEFAULT_JOINTS],
            weights: vec![DEFAULT_WEIGHTS, [0.25, 0.75, 0.0, 0.0], DEFAULT_WEIGHTS],
        }
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn key_file_name_is_hex() {
        let key = CacheKey::for_path("");
        assert_eq!(key.file_name(), "cbf29ce484222325.mesh");
    }

    #[test]
    fn header_layout() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, &sample_mesh()).unwrap();
        assert_eq!(&bytes[0..4], b"MESH");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &9u32.to_le_bytes());
    }

    #[test]
    fn record_round_trip() {
        let mesh = sample_mesh();
        let mut bytes = Vec::new();
        write_record(&mut bytes, &mesh).unwrap();
        assert_eq!(read_record(&bytes).unwrap(), Some(mesh));
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, &sample_mesh()).unwrap();
        bytes[4..8].copy_from_slice(&(MESH_CACHE_VERSION + 1).to_le_bytes());
        assert_eq!(read_record(&bytes).unwrap(), None);

        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(read_record(&bytes).unwrap(), None);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut bytes = Vec::new();
        write_record(&mut bytes, &sample_mesh()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(read_record(&bytes).is_err());
    }

    #[test]
    fn absurd_count_is_rejected_without_allocating() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MESH_CACHE_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&MESH_CACHE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(read_record(&bytes).is_err());
    }

    #[test]
    fn ensure_dir_creates_nested_and_tolerates_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn cache_put_get_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = MeshCache::with_memory(tmp.path().join("meshes"), false);
        let key = CacheKey::for_path("/assets/model.glb");
        assert!(cache.get(key).is_none());

        let mesh = sample_mesh();
        cache.put(key, &mesh).unwrap();
        assert!(cache.path_for(key).is_file());
        assert_eq!(cache.get(key), Some(mesh));

        assert!(cache.remove(key));
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn memory_layer_serves_after_disk_entry_is_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = MeshCache::new(tmp.path());
        let key = CacheKey::for_path("/assets/crate.glb");
        cache.put(key, &sample_mesh()).unwrap();
        fs::remove_file(cache.path_for(key)).unwrap();
        assert!(cache.get(key).is_some());

        cache.clear_memory();
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn unwritable_directory_fails_put_but_keeps_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();
        let cache = MeshCache::new(blocker.join("meshes"));
        let key = CacheKey::for_path("x");
        assert!(cache.put(key, &sample_mesh()).is_err());
        assert!(cache.get(key).is_some());
    }
}
