//! Skeletal baking: samples a clip at a fixed rate and produces one skinning
//! palette (global joint transform times inverse bind matrix) per frame.

use std::path::Path;

use glam::{Mat4, Quat, Vec3};
use kiln_core::{lerp_vec3, nlerp_quat, to_column_major, SampleClock, Transform};
use tracing::{debug, info, warn};

use crate::animation::{clip_duration, clip_name};
use crate::document::Model;
use crate::error::AssetError;
use crate::hierarchy::{LocalTransform, NodeHierarchy, NodeNameLookup};

/// Floats per joint matrix in the baked palette.
pub const MATRIX_FLOATS: usize = 16;

/// Largest palette one bake may allocate, in floats (1 GiB).
pub const MAX_PALETTE_FLOATS: usize = 1 << 28;

/// Channel bookkeeping from one bake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BakeReport {
    /// Channels whose target was found in the model and whose track was stored.
    pub mapped_channels: usize,
    /// Channels whose target could not be mapped onto a model node.
    pub skipped_channels: usize,
}

/// Per-frame joint palettes for one (model, animation) pair.
///
/// `matrices` holds `frame_count * joint_count` column-major 4x4 matrices;
/// the matrix for `joint` at `frame` starts at
/// `(frame * joint_count + joint) * 16`.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedSkinningFrames {
    pub joint_count: usize,
    pub frame_count: usize,
    pub duration: f32,
    pub frame_rate: f32,
    pub matrices: Vec<f32>,
    pub report: BakeReport,
}

impl BakedSkinningFrames {
    /// The flat palette of one frame.
    pub fn frame(&self, frame: usize) -> Option<&[f32]> {
        if frame >= self.frame_count {
            return None;
        }
        let stride = self.joint_count * MATRIX_FLOATS;
        self.matrices.get(frame * stride..(frame + 1) * stride)
    }

    pub fn joint_matrix(&self, frame: usize, joint: usize) -> Option<Mat4> {
        if joint >= self.joint_count {
            return None;
        }
        let start = joint * MATRIX_FLOATS;
        let floats = self.frame(frame)?.get(start..start + MATRIX_FLOATS)?;
        Some(Mat4::from_cols_slice(floats))
    }
}

/// How values between two keyframes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

/// Keyframe times and values for one animated property.
#[derive(Debug, Clone, PartialEq)]
pub struct Track<T> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
    pub interpolation: Interpolation,
}

impl<T: Copy> Track<T> {
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: Interpolation) -> Self {
        Self {
            times,
            values,
            interpolation,
        }
    }

    /// Sample at `t`, clamping to the first/last key outside the track's range.
    pub fn sample(&self, t: f32, blend: impl Fn(T, T, f32) -> T) -> Option<T> {
        let len = self.times.len().min(self.values.len());
        if len == 0 {
            return None;
        }

        let times = &self.times[..len];
        if t <= times[0] {
            return Some(self.values[0]);
        }
        if t >= times[len - 1] {
            return Some(self.values[len - 1]);
        }

        let next = times.partition_point(|&key| key <= t).clamp(1, len - 1);
        let prev = next - 1;
        if self.interpolation == Interpolation::Step {
            return Some(self.values[prev]);
        }

        let span = times[next] - times[prev];
        let alpha = if span > 0.0 {
            ((t - times[prev]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(blend(self.values[prev], self.values[next], alpha))
    }
}

/// Animated tracks attached to one node.
#[derive(Debug, Clone, Default)]
struct NodeTracks {
    translation: Option<Track<Vec3>>,
    rotation: Option<Track<Quat>>,
    scale: Option<Track<Vec3>>,
}

impl NodeTracks {
    fn is_empty(&self) -> bool {
        self.translation.is_none() && self.rotation.is_none() && self.scale.is_none()
    }

    fn apply(&self, base: Transform, t: f32) -> Transform {
        let translation = self
            .translation
            .as_ref()
            .and_then(|track| track.sample(t, lerp_vec3))
            .unwrap_or(base.translation);
        let rotation = self
            .rotation
            .as_ref()
            .and_then(|track| track.sample(t, nlerp_quat))
            .unwrap_or(base.rotation);
        let scale = self
            .scale
            .as_ref()
            .and_then(|track| track.sample(t, lerp_vec3))
            .unwrap_or(base.scale);
        Transform {
            translation,
            rotation,
            scale,
        }
    }
}

/// Keyframe values with cubic-spline tangents removed.
fn keyframe_values<T: Copy>(values: Vec<T>, key_count: usize, cubic: bool) -> Vec<T> {
    if cubic && values.len() >= key_count * 3 {
        values.chunks_exact(3).map(|triplet| triplet[1]).collect()
    } else {
        values
    }
}

/// Load the model and animation files and bake the selected clip.
///
/// When both paths name the same file it is loaded once and channel targets
/// are used as node indices directly; otherwise targets are matched to model
/// nodes by name.
pub fn bake_skinning(
    model_path: &Path,
    animation_path: &Path,
    clip: Option<&str>,
) -> Result<BakedSkinningFrames, AssetError> {
    let model = Model::open(model_path)?;
    if model_path == animation_path {
        bake_from_models(&model, None, clip)
    } else {
        let animation = Model::open(animation_path)?;
        bake_from_models(&model, Some(&animation), clip)
    }
}

/// Bake from already loaded documents. `animation` is `None` when the clip
/// lives in the model file itself.
pub fn bake_from_models(
    model: &Model,
    animation: Option<&Model>,
    clip: Option<&str>,
) -> Result<BakedSkinningFrames, AssetError> {
    let model_doc = model.document();
    let skin = model_doc
        .skins()
        .next()
        .ok_or_else(|| AssetError::NoSkin(model.path().to_path_buf()))?;
    let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
    if joints.is_empty() {
        return Err(AssetError::EmptySkin(model.path().to_path_buf()));
    }

    let hierarchy = NodeHierarchy::from_document(model_doc);
    let inverse_binds = inverse_bind_matrices(model, &skin, joints.len())?;

    let source = animation.unwrap_or(model);
    let gltf_animation = select_clip(source, clip)?;

    let (tracks, report) = collect_tracks(model, &hierarchy, source, animation.is_some(), &gltf_animation)?;
    let clock = SampleClock::new(clip_duration(source, &gltf_animation)).map_err(|e| {
        AssetError::ClipTooLong {
            path: source.path().to_path_buf(),
            clip: clip_name(&gltf_animation),
            source: e,
        }
    })?;

    let joint_count = joints.len();
    let palette_len = palette_len(clock.frame_count(), joint_count).ok_or_else(|| {
        AssetError::PaletteTooLarge {
            path: model.path().to_path_buf(),
            joint_count,
            frame_count: clock.frame_count(),
            limit: MAX_PALETTE_FLOATS,
        }
    })?;
    let mut matrices = vec![0.0f32; palette_len];
    let mut locals = hierarchy.default_locals();

    for (frame, t) in clock.frames() {
        for (index, node) in hierarchy.nodes().iter().enumerate() {
            if let LocalTransform::Decomposed(base) = node.local {
                if !tracks[index].is_empty() {
                    locals[index] = tracks[index].apply(base, t).matrix();
                }
            }
        }

        let globals = hierarchy.global_transforms(&locals);
        for (j, (&node, inverse_bind)) in joints.iter().zip(&inverse_binds).enumerate() {
            let global = globals.get(node).copied().unwrap_or(Mat4::IDENTITY);
            let palette = global * *inverse_bind;
            let start = (frame * joint_count + j) * MATRIX_FLOATS;
            matrices[start..start + MATRIX_FLOATS].copy_from_slice(&to_column_major(&palette));
        }
    }

    info!(
        "Baked '{}' onto '{}': {} joints, {} frames at {} Hz ({:.2}s), {} channels mapped, {} skipped",
        clip_name(&gltf_animation),
        model.path().display(),
        joint_count,
        clock.frame_count(),
        clock.rate_hz(),
        clock.duration(),
        report.mapped_channels,
        report.skipped_channels
    );

    Ok(BakedSkinningFrames {
        joint_count,
        frame_count: clock.frame_count(),
        duration: clock.duration(),
        frame_rate: clock.rate_hz(),
        matrices,
        report,
    })
}

/// Floats needed for `frame_count` palettes of `joint_count` matrices, if
/// within [`MAX_PALETTE_FLOATS`].
fn palette_len(frame_count: usize, joint_count: usize) -> Option<usize> {
    frame_count
        .checked_mul(joint_count)?
        .checked_mul(MATRIX_FLOATS)
        .filter(|&len| len <= MAX_PALETTE_FLOATS)
}

/// One inverse bind matrix per joint; missing data degrades to identity.
fn inverse_bind_matrices(model: &Model, skin: &gltf::Skin, joint_count: usize) -> Result<Vec<Mat4>, AssetError> {
    let Some(accessor) = skin.inverse_bind_matrices() else {
        debug!(
            "Skin in '{}' has no inverse bind matrices, using identity",
            model.path().display()
        );
        return Ok(vec![Mat4::IDENTITY; joint_count]);
    };

    let mut matrices: Vec<Mat4> = model
        .read_matrices(&accessor)?
        .iter()
        .map(Mat4::from_cols_array)
        .collect();
    if matrices.len() < joint_count {
        warn!(
            "Skin in '{}' has {} inverse bind matrices for {} joints, padding with identity",
            model.path().display(),
            matrices.len(),
            joint_count
        );
    }
    matrices.resize(joint_count, Mat4::IDENTITY);
    Ok(matrices)
}

fn select_clip<'a>(source: &'a Model, clip: Option<&str>) -> Result<gltf::Animation<'a>, AssetError> {
    let mut animations = source.document().animations();
    match clip {
        Some(name) => {
            if source.document().animations().next().is_none() {
                return Err(AssetError::NoAnimations(source.path().to_path_buf()));
            }
            animations
                .find(|animation| clip_name(animation) == name)
                .ok_or_else(|| AssetError::AnimationNotFound {
                    path: source.path().to_path_buf(),
                    name: name.to_string(),
                })
        }
        None => animations
            .next()
            .ok_or_else(|| AssetError::NoAnimations(source.path().to_path_buf())),
    }
}

/// Map every channel of the clip onto a model node and read its track.
fn collect_tracks(
    model: &Model,
    hierarchy: &NodeHierarchy,
    source: &Model,
    cross_file: bool,
    animation: &gltf::Animation,
) -> Result<(Vec<NodeTracks>, BakeReport), AssetError> {
    use gltf::animation::{Interpolation as GltfInterpolation, Property};

    let lookup = cross_file.then(|| NodeNameLookup::new(hierarchy));
    let mut tracks = vec![NodeTracks::default(); hierarchy.len()];
    let mut report = BakeReport::default();

    for channel in animation.channels() {
        let target = channel.target();
        let target_node = target.node();
        let mapped = match &lookup {
            Some(lookup) => target_node.name().and_then(|name| lookup.resolve(name)),
            None => Some(target_node.index()).filter(|&index| index < hierarchy.len()),
        };
        let Some(node) = mapped else {
            debug!(
                "No node in '{}' for channel target '{}'",
                model.path().display(),
                target_node.name().unwrap_or("<unnamed>")
            );
            report.skipped_channels += 1;
            continue;
        };

        let sampler = channel.sampler();
        let times = source.read_scalars(&sampler.input())?;
        let cubic = sampler.interpolation() == GltfInterpolation::CubicSpline;
        let interpolation = match sampler.interpolation() {
            GltfInterpolation::Step => Interpolation::Step,
            _ => Interpolation::Linear,
        };
        let output = sampler.output();

        match target.property() {
            Property::Translation => {
                let values = source.read_floats::<3>(&output)?;
                let values = keyframe_values(values, times.len(), cubic)
                    .into_iter()
                    .map(Vec3::from_array)
                    .collect();
                tracks[node].translation = Some(Track::new(times, values, interpolation));
            }
            Property::Rotation => {
                let values = source.read_floats::<4>(&output)?;
                let values = keyframe_values(values, times.len(), cubic)
                    .into_iter()
                    .map(Quat::from_array)
                    .collect();
                tracks[node].rotation = Some(Track::new(times, values, interpolation));
            }
            Property::Scale => {
                let values = source.read_floats::<3>(&output)?;
                let values = keyframe_values(values, times.len(), cubic)
                    .into_iter()
                    .map(Vec3::from_array)
                    .collect();
                tracks[node].scale = Some(Track::new(times, values, interpolation));
            }
            Property::MorphTargetWeights => {
                debug!("Ignoring morph target weights channel");
                continue;
            }
        }

        if matches!(
            hierarchy.node(node).map(|n| n.local),
            Some(LocalTransform::Matrix(_))
        ) {
            debug!("Node {} has an explicit matrix; its animation is ignored", node);
        }
        report.mapped_channels += 1;
    }

    Ok((tracks, report))
}
