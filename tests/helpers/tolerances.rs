//! Tolerance constants for stretcher tests.
//!
//! Different checks need different precision levels.

/// Floating point rounding errors (silence in, silence out).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Analysis/resynthesis round trips at unity ratios.
pub const DSP_EPSILON: f32 = 1e-4;

/// Audio perceptual tolerance (~-60dB, inaudible differences).
pub const PERCEPTUAL_EPSILON: f32 = 0.001;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Relative error allowed when estimating a tone's frequency from zero
/// crossings.
pub const FREQUENCY_TOLERANCE: f32 = 0.05;

/// Level change in dB allowed between a steady tone and its stretched or
/// shifted output.
pub const LEVEL_TOLERANCE_DB: f32 = 1.0;
