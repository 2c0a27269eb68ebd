//! Core types used throughout the kiln asset pipeline

use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Quaternions with a squared length below this are treated as degenerate.
const DEGENERATE_QUAT_LENGTH_SQ: f32 = 1e-12;

/// Decomposed local transform: translation, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a transform from raw glTF-style arrays (rotation is `[x, y, z, w]`).
    pub fn from_arrays(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            translation: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        }
    }

    /// Create a transform with only a translation
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Compose the local matrix as T * R * S (applied right-to-left to column vectors).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Linear interpolation between two vectors.
pub fn lerp_vec3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a + (b - a) * t
}

/// Shortest-path normalized linear blend between two rotations.
///
/// When the two quaternions lie in opposite hemispheres the second one is
/// negated before blending, so antipodal encodings of the same rotation never
/// cancel out. The result is renormalized; a degenerate blend falls back to
/// the identity rotation.
pub fn nlerp_quat(a: Quat, b: Quat, t: f32) -> Quat {
    let a = Vec4::from(a);
    let mut b = Vec4::from(b);
    if a.dot(b) < 0.0 {
        b = -b;
    }

    let blended = a + (b - a) * t;
    let length_sq = blended.length_squared();
    if length_sq < DEGENERATE_QUAT_LENGTH_SQ {
        return Quat::IDENTITY;
    }
    Quat::from_vec4(blended / length_sq.sqrt())
}

/// Column-major array for a matrix, the layout GPU skinning palettes expect.
pub fn to_column_major(matrix: &Mat4) -> [f32; 16] {
    matrix.to_cols_array()
}
