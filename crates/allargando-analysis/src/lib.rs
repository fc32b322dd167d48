//! Spectral analysis for the allargando stretcher.
//!
//! - [`SpectralTransform`]: shared windowed FFT pair
//! - [`TransientDetector`]: per-frame percussive onset classification
//! - [`ProfileBuilder`] / [`AnalysisProfile`]: offline study pass
//! - [`StretchCalculator`]: per-frame synthesis hop scheduling

pub mod spectrum;
pub use spectrum::{bin_frequencies, polar_bins, wrap_phase, SpectralTransform};

pub mod transient;
pub use transient::TransientDetector;

pub mod profile;
pub use profile::{AnalysisProfile, FrameFeatures, ProfileBuilder};

pub mod calculator;
pub use calculator::StretchCalculator;

pub use rustfft::num_complex::Complex32;
