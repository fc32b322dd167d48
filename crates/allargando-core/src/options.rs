//! Processing options and crispness presets.
//!
//! [`StretchOptions`] is the caller-facing record. It is validated once into a
//! [`StretchConfig`](crate::StretchConfig) when a stretcher is constructed.
//!
//! # Example
//!
//! ```
//! use allargando_core::{Crispness, StretchOptions, TransientMode, WindowSize};
//!
//! let options = StretchOptions::new()
//!     .crispness(Crispness::new(0).unwrap())
//!     .softening(false);
//!
//! assert_eq!(options.transients, TransientMode::None);
//! assert_eq!(options.window, WindowSize::Long);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::config::StretchConfig;

/// Offline two-pass or bounded-latency streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    /// Study pass followed by a processing pass.
    #[default]
    Offline,

    /// Single pass with bounded per-call latency. Implies precision on and
    /// threading off.
    RealTime,
}

/// Whether per-channel vocoder work runs on worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadingMode {
    /// Always inline on the caller's thread.
    Never,

    /// Workers when there is more than one channel and more than one CPU.
    #[default]
    Auto,

    /// One worker per channel regardless of detected CPUs.
    Always,
}

/// Phase handling at detected transients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransientMode {
    /// Phase always propagates continuously.
    None,

    /// Phase reset restricted to the extreme frequency bands.
    BandLimited,

    /// Phase reset across the whole spectrum.
    #[default]
    Full,
}

/// Inter-bin phase relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhaseMode {
    /// Bins near a spectral peak follow the peak's phase.
    #[default]
    Locked,

    /// Every bin propagates on its own.
    Independent,
}

/// Analysis window length preset.
///
/// Lengths are given at 48 kHz and scaled to the nearest power of two at
/// other sample rates.
///
/// - **Short (1024)**: percussive material, tighter timing
/// - **Standard (2048)**: default balance
/// - **Long (4096)**: smoother tonal material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowSize {
    Short,
    #[default]
    Standard,
    Long,
}

impl WindowSize {
    /// Window length at 48 kHz.
    pub fn base_length(&self) -> usize {
        match self {
            WindowSize::Short => 1024,
            WindowSize::Standard => 2048,
            WindowSize::Long => 4096,
        }
    }

    /// Window length for a sample rate, rounded up to a power of two.
    pub fn length_for(&self, sample_rate: f64) -> usize {
        let scaled = (self.base_length() as f64 * sample_rate / 48000.0).round() as usize;
        scaled.max(256).next_power_of_two()
    }
}

/// Caller-facing processing options.
///
/// Immutable once a stretcher is built from them. `Default` matches crispness 4
/// in offline mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchOptions {
    pub process_mode: ProcessMode,

    /// Minimise timing distortion: uniform output hops instead of elastic
    /// redistribution around transients.
    pub precise: bool,

    pub threading: ThreadingMode,
    pub transients: TransientMode,
    pub phase: PhaseMode,

    /// Relax peak locking as the stretch magnitude grows.
    pub softening: bool,

    pub window: WindowSize,

    /// Band edges in Hz (`thresh0`, `thresh1`, `thresh2`). `None` selects the
    /// default for that edge.
    pub thresholds: [Option<f32>; 3],

    /// Instance-scoped diagnostics level (0..=3). Level 3 mixes audible ticks
    /// into the output at transient frames.
    pub debug_level: u8,
}

impl Default for StretchOptions {
    fn default() -> Self {
        Self {
            process_mode: ProcessMode::Offline,
            precise: false,
            threading: ThreadingMode::Auto,
            transients: TransientMode::Full,
            phase: PhaseMode::Locked,
            softening: true,
            window: WindowSize::Standard,
            thresholds: [None; 3],
            debug_level: 0,
        }
    }
}

impl StretchOptions {
    /// Highest accepted debug level.
    pub const MAX_DEBUG_LEVEL: u8 = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_mode(mut self, mode: ProcessMode) -> Self {
        self.process_mode = mode;
        self
    }

    /// Shorthand for `process_mode(ProcessMode::RealTime)`.
    pub fn realtime(self) -> Self {
        self.process_mode(ProcessMode::RealTime)
    }

    pub fn precise(mut self, precise: bool) -> Self {
        self.precise = precise;
        self
    }

    pub fn threading(mut self, threading: ThreadingMode) -> Self {
        self.threading = threading;
        self
    }

    pub fn transients(mut self, transients: TransientMode) -> Self {
        self.transients = transients;
        self
    }

    pub fn phase(mut self, phase: PhaseMode) -> Self {
        self.phase = phase;
        self
    }

    pub fn softening(mut self, softening: bool) -> Self {
        self.softening = softening;
        self
    }

    pub fn window(mut self, window: WindowSize) -> Self {
        self.window = window;
        self
    }

    /// Set one band edge (`index` 0, 1 or 2) in Hz.
    pub fn threshold(mut self, index: usize, hz: f32) -> Self {
        if let Some(slot) = self.thresholds.get_mut(index) {
            *slot = Some(hz);
        }
        self
    }

    pub fn debug_level(mut self, level: u8) -> Self {
        self.debug_level = level;
        self
    }

    /// Overwrite transient, phase and window settings from a crispness preset.
    pub fn crispness(self, crispness: Crispness) -> Self {
        crispness.apply(self)
    }

    pub fn is_realtime(&self) -> bool {
        self.process_mode == ProcessMode::RealTime
    }

    /// Resolve against a sample rate and channel count.
    pub fn validate(&self, sample_rate: f64, channels: usize) -> Result<StretchConfig> {
        StretchConfig::new(sample_rate, channels, self)
    }
}

/// Single quality knob bundling transient, phase-lock and window settings.
///
/// | level | transients | peak lock | window |
/// |---|---|---|---|
/// | 0 | none | off | long |
/// | 1 | none | off | standard |
/// | 2 | none | on | standard |
/// | 3 | band-limited | on | standard |
/// | 4 (default) | full | on | standard |
/// | 5 | full | off | short |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Crispness(u8);

impl Crispness {
    pub const MAX: u8 = 5;
    pub const DEFAULT: Crispness = Crispness(4);

    pub fn new(level: u8) -> Result<Self> {
        if level <= Self::MAX {
            Ok(Self(level))
        } else {
            Err(Error::Config(format!(
                "crispness must be between 0 and {}, got {level}",
                Self::MAX
            )))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// The (transients, phase, window) triple this level selects.
    pub fn settings(&self) -> (TransientMode, PhaseMode, WindowSize) {
        use PhaseMode::{Independent, Locked};
        match self.0 {
            0 => (TransientMode::None, Independent, WindowSize::Long),
            1 => (TransientMode::None, Independent, WindowSize::Standard),
            2 => (TransientMode::None, Locked, WindowSize::Standard),
            3 => (TransientMode::BandLimited, Locked, WindowSize::Standard),
            4 => (TransientMode::Full, Locked, WindowSize::Standard),
            _ => (TransientMode::Full, Independent, WindowSize::Short),
        }
    }

    pub fn apply(&self, options: StretchOptions) -> StretchOptions {
        let (transients, phase, window) = self.settings();
        StretchOptions {
            transients,
            phase,
            window,
            ..options
        }
    }

    /// What the level is suited for.
    pub fn description(&self) -> &'static str {
        match self.0 {
            0 => "Mushy",
            1 => "Smooth",
            2 => "Balanced multitimbral mixture",
            3 => "Unpitched percussion with stable notes",
            4 => "Crisp monophonic instrumental",
            _ => "Unpitched solo percussion",
        }
    }
}

impl Default for Crispness {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Crispness {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<Crispness> for u8 {
    fn from(crispness: Crispness) -> u8 {
        crispness.0
    }
}
