//! Kiln Core - Math and time primitives for the kiln asset pipeline
//!
//! This crate provides the foundational types shared by the asset crates:
//! - Mathematical primitives (re-exported from glam)
//! - TRS transform composition and interpolation helpers
//! - Fixed-rate sampling clock for animation baking

pub mod time;
pub mod types;

pub use glam::{Mat4, Quat, Vec3, Vec4};
pub use time::{ClockError, SampleClock, MAX_FRAME_COUNT, MIN_ANIMATED_DURATION, SAMPLE_RATE_HZ};
pub use types::{lerp_vec3, nlerp_quat, to_column_major, Transform};
