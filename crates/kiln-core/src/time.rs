//! Fixed-rate sampling clock
//!
//! Converts a clip duration into a frame count and per-frame timestamps for
//! baking keyframe animation at a constant rate.

/// Rate at which skinning palettes are baked, in frames per second.
pub const SAMPLE_RATE_HZ: f32 = 30.0;

/// Clips shorter than this are baked as a single static pose.
pub const MIN_ANIMATED_DURATION: f32 = 1e-4;

/// Most frames a single clip may bake to: one hour at [`SAMPLE_RATE_HZ`].
pub const MAX_FRAME_COUNT: usize = 3600 * 30 + 1;

/// Maps frame indices to timestamps for a clip of known duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleClock {
    rate_hz: f32,
    duration: f32,
    frame_count: usize,
}

impl SampleClock {
    /// Clock for a clip of `duration` seconds at [`SAMPLE_RATE_HZ`].
    pub fn new(duration: f32) -> Result<Self, ClockError> {
        Self::with_rate(duration, SAMPLE_RATE_HZ)
    }

    /// Clock for a clip of `duration` seconds at an arbitrary rate.
    ///
    /// An animated clip always yields at least two frames; a clip whose
    /// duration is effectively zero (or not a finite number) yields one.
    /// Clips needing more than [`MAX_FRAME_COUNT`] frames are rejected.
    pub fn with_rate(duration: f32, rate_hz: f32) -> Result<Self, ClockError> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(ClockError::InvalidRate(rate_hz));
        }

        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        let frame_count = if duration > MIN_ANIMATED_DURATION {
            // The float-to-int cast saturates, so huge clips fail the cap check.
            let intervals = (f64::from(duration) * f64::from(rate_hz)).ceil() as usize;
            intervals
                .checked_add(1)
                .filter(|&frames| frames <= MAX_FRAME_COUNT)
                .ok_or(ClockError::TooManyFrames {
                    duration,
                    rate_hz,
                    limit: MAX_FRAME_COUNT,
                })?
                .max(2)
        } else {
            1
        };

        Ok(Self {
            rate_hz,
            duration,
            frame_count,
        })
    }

    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Number of frames to bake
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Timestamp of a frame in seconds.
    pub fn frame_time(&self, frame: usize) -> f32 {
        frame as f32 / self.rate_hz
    }

    /// Iterate over `(frame_index, timestamp)` pairs.
    pub fn frames(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        (0..self.frame_count).map(move |frame| (frame, self.frame_time(frame)))
    }
}

/// Errors that can occur when building a sampling clock
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ClockError {
    #[error("a {duration}s clip at {rate_hz} Hz needs more than {limit} frames")]
    TooManyFrames {
        duration: f32,
        rate_hz: f32,
        limit: usize,
    },

    #[error("Invalid sample rate: {0} Hz")]
    InvalidRate(f32),
}
