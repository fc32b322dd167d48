//! Core types for the allargando time-stretcher.
//!
//! - [`StretchOptions`] / [`Crispness`]: caller-facing processing options
//! - [`StretchConfig`]: options validated against a sample rate and channel count
//! - [`Ratios`]: time and frequency scale factors
//! - [`SampleQueue`]: per-channel FIFOs decoupling caller blocks from the hop size
//! - [`Error`]: configuration and call-ordering errors

pub mod error;
pub use error::{Error, Result};

pub mod options;
pub use options::{
    Crispness, PhaseMode, ProcessMode, StretchOptions, ThreadingMode, TransientMode, WindowSize,
};

pub mod config;
pub use config::{BandBins, FrequencyBands, StretchConfig, DEFAULT_THRESHOLDS};

pub mod ratio;
pub use ratio::{check_ratio, semitones_to_ratio, Ratios};

pub mod queue;
pub use queue::SampleQueue;

pub mod window;
pub use window::hann_window;
