//! # Allargando - Phase-Vocoder Time-Stretching and Pitch-Shifting
//!
//! Changes the duration of audio without changing its pitch, and its pitch
//! without changing its duration, independently and by arbitrary ratios.
//!
//! ## Architecture
//!
//! Allargando is an umbrella crate that coordinates:
//! - **allargando-core** - Options, crispness presets, validated configuration, sample queues
//! - **allargando-analysis** - FFT, transient detection, study-pass profiles, hop scheduling
//! - **allargando-stretch** - Phase vocoder, channel workers, the streaming `Stretcher`
//! - **allargando-cli** - WAV-to-WAV command-line driver (feature `cli`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use allargando::prelude::*;
//!
//! # fn main() -> allargando::Result<()> {
//! let input = vec![vec![0.0f32; 44100]];
//!
//! // Twice as long, one semitone up
//! let mut stretcher = Stretcher::new(
//!     44100.0,
//!     1,
//!     StretchOptions::default(),
//!     2.0,
//!     semitones_to_ratio(1.0),
//! )?;
//! stretcher.set_expected_input_duration(44100);
//!
//! // Offline: study everything first
//! stretcher.study(&input, true)?;
//! stretcher.process(&input, true)?;
//!
//! let mut output = vec![vec![0.0f32; 88200]];
//! let mut written = 0;
//! while let Some(ready) = stretcher.available() {
//!     if ready == 0 {
//!         continue;
//!     }
//!     let mut block = vec![vec![0.0f32; ready]];
//!     let got = stretcher.retrieve(&mut block, ready)?;
//!     output[0][written..written + got].copy_from_slice(&block[0][..got]);
//!     written += got;
//! }
//! assert_eq!(written, 88200);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Engine only
//! - `cli` - Command-line driver and WAV I/O
//! - `full` - Everything enabled

/// Re-export of allargando-core for direct access
pub use allargando_core as core;

/// Spectral analysis building blocks
pub use allargando_analysis as analysis;

/// Phase vocoder engine
pub use allargando_stretch as stretch;

// Core types
pub use allargando_core::{
    semitones_to_ratio, Crispness, PhaseMode, ProcessMode, StretchConfig, StretchOptions,
    ThreadingMode, TransientMode, WindowSize,
};

// Engine
pub use allargando_stretch::{AvailabilitySignal, Stretcher, StretcherState};

#[cfg(feature = "cli")]
pub use allargando_cli as cli;

mod error;
pub use error::{Error, Result};

/// Everything needed to drive a stretcher.
pub mod prelude {
    pub use crate::{
        semitones_to_ratio, AvailabilitySignal, Crispness, PhaseMode, ProcessMode,
        StretchOptions, Stretcher, StretcherState, ThreadingMode, TransientMode, WindowSize,
    };

    pub use crate::{Error, Result};
}
