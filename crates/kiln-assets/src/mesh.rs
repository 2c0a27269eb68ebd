use glam::Vec3;

/// Skin binding used for vertices that carry no joint data: joint 0, full weight.
pub const DEFAULT_JOINTS: [u32; 4] = [0, 0, 0, 0];
pub const DEFAULT_WEIGHTS: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// A flat, non-indexed triangle list ready for upload (renderer-agnostic).
///
/// Every non-empty attribute array has one entry per position, and the
/// vertex count is a multiple of three. `uvs` and `colors` are empty when the
/// source asset had none; joints and weights are always populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub joints: Vec<[u32; 4]>,
    pub weights: Vec<[f32; 4]>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn has_uv(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    /// True when any vertex is bound to something other than the default joint.
    pub fn is_skinned(&self) -> bool {
        self.joints.iter().any(|j| *j != DEFAULT_JOINTS)
            || self.weights.iter().any(|w| *w != DEFAULT_WEIGHTS)
    }

    /// Axis-aligned bounds of all positions, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.positions.iter().map(|p| Vec3::from_array(*p));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Check the array-length invariants.
    pub fn validate(&self) -> Result<(), String> {
        let count = self.positions.len();
        if count % 3 != 0 {
            return Err(format!("vertex count {} is not a multiple of 3", count));
        }

        let lengths = [
            ("normals", self.normals.len()),
            ("uvs", self.uvs.len()),
            ("colors", self.colors.len()),
            ("joints", self.joints.len()),
            ("weights", self.weights.len()),
        ];
        for (name, len) in lengths {
            if len != 0 && len != count {
                return Err(format!("{} has {} entries for {} vertices", name, len, count));
            }
        }
        Ok(())
    }
}
