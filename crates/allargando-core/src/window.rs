//! Analysis/synthesis windows.

use std::f32::consts::PI;

/// Periodic Hann window of `size` samples.
///
/// The periodic form keeps the squared-window overlap sum flat at a quarter
/// window hop, which the overlap-add normalisation relies on.
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}
