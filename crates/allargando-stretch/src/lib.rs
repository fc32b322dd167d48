//! Phase-vocoder engine for allargando.
//!
//! [`Stretcher`] is the public streaming API. Internally every channel owns a
//! [`channel::ChannelState`]; frames are scheduled once per call and run on each
//! channel either inline or on a per-channel worker pool.

pub mod error;
pub use error::{Error, Result};

pub mod plan;
pub use plan::FramePlan;

pub mod vocoder;
pub use vocoder::PhaseVocoder;

pub mod channel;
pub use channel::ChannelState;

mod pool;

pub mod threading;
pub use threading::use_threads;

pub mod signal;
pub use signal::AvailabilitySignal;

pub mod stretcher;
pub use stretcher::{Stretcher, StretcherState};
