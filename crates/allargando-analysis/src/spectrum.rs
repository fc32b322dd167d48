//! Windowed forward and inverse transforms.
//!
//! A [`SpectralTransform`] is planned once per stretcher and cloned into every
//! channel; clones share the FFT plans and the window.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use allargando_core::hann_window;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};

const TWO_PI: f32 = 2.0 * PI;

/// Planned forward/inverse FFT pair with a shared Hann window.
#[derive(Clone)]
pub struct SpectralTransform {
    size: usize,
    window: Arc<[f32]>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl SpectralTransform {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            size,
            window: hann_window(size).into(),
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    #[inline]
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Scratch length needed by [`forward`](Self::forward) and [`inverse`](Self::inverse).
    pub fn scratch_len(&self) -> usize {
        self.forward
            .get_inplace_scratch_len()
            .max(self.inverse.get_inplace_scratch_len())
    }

    /// Window `frame` into `spectrum` and transform it in place.
    pub fn forward(&self, frame: &[f32], spectrum: &mut [Complex32], scratch: &mut [Complex32]) {
        assert_eq!(frame.len(), self.size, "analysis frame length");
        assert_eq!(spectrum.len(), self.size, "spectrum length");

        for ((bin, &sample), &w) in spectrum.iter_mut().zip(frame).zip(self.window.iter()) {
            *bin = Complex32::new(sample * w, 0.0);
        }
        self.forward.process_with_scratch(spectrum, scratch);
    }

    /// Mirror the non-negative bins, transform back and apply the synthesis
    /// window, writing the real signal into `out`.
    pub fn inverse(&self, spectrum: &mut [Complex32], scratch: &mut [Complex32], out: &mut [f32]) {
        assert_eq!(spectrum.len(), self.size, "spectrum length");
        assert_eq!(out.len(), self.size, "synthesis frame length");

        let num_bins = self.num_bins();
        for bin in 1..num_bins - 1 {
            spectrum[self.size - bin] = spectrum[bin].conj();
        }
        self.inverse.process_with_scratch(spectrum, scratch);

        let scale = 1.0 / self.size as f32;
        for ((sample, bin), &w) in out.iter_mut().zip(spectrum.iter()).zip(self.window.iter()) {
            *sample = bin.re * scale * w;
        }
    }
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("size", &self.size)
            .finish()
    }
}

/// Split the first `magnitudes.len()` bins into magnitude and phase.
pub fn polar_bins(spectrum: &[Complex32], magnitudes: &mut [f32], phases: &mut [f32]) {
    for ((bin, mag), phase) in spectrum.iter().zip(magnitudes.iter_mut()).zip(phases.iter_mut()) {
        *mag = bin.norm();
        *phase = bin.arg();
    }
}

/// Wrap a phase value to [-PI, PI).
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    let p = phase + PI;
    p - (p / TWO_PI).floor() * TWO_PI - PI
}

/// Centre frequency of every bin in radians per sample.
pub fn bin_frequencies(size: usize) -> Vec<f32> {
    (0..size / 2 + 1)
        .map(|k| TWO_PI * k as f32 / size as f32)
        .collect()
}
