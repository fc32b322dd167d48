//! Validated, immutable stretcher configuration.

use crate::error::{Error, Result};
use crate::options::{PhaseMode, StretchOptions, ThreadingMode, TransientMode, WindowSize};

/// Default band edges in Hz (`thresh0`, `thresh1`, `thresh2`).
pub const DEFAULT_THRESHOLDS: [f32; 3] = [600.0, 1200.0, 12000.0];

/// Default onset fraction above which a frame counts as transient.
pub const DEFAULT_TRANSIENT_SENSITIVITY: f32 = 0.35;

/// Band edges in Hz splitting the spectrum into low/mid/high regions.
///
/// - below `low`: never peak-locked; an extreme band for transients
/// - `low`..`mid`: mid band, excluded from band-limited transients
/// - above `mid`: upper extreme band
/// - above `high`: widest peak-lock neighbourhood ceiling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl FrequencyBands {
    /// Raise all edges together as the stretch magnitude grows past 1.
    ///
    /// Bins under the raised `low` edge stop following peaks, so locking
    /// loosens progressively at extreme ratios.
    pub fn softened(&self, stretch_magnitude: f64) -> Self {
        if stretch_magnitude <= 1.0 {
            return *self;
        }
        let excess = (stretch_magnitude - 1.0) as f32;
        let raised = 600.0 + 600.0 * excess.powi(3) * 2.0;
        if raised <= self.low {
            return *self;
        }
        let scale = raised / self.low;
        Self {
            low: raised,
            mid: self.mid * scale,
            high: self.high * scale,
        }
    }

    /// Convert edges to bin indices for a window length, clamped to Nyquist.
    pub fn to_bins(&self, window_length: usize, sample_rate: f64) -> BandBins {
        let nyquist_bin = window_length / 2;
        let bin = |hz: f32| {
            ((hz as f64 * window_length as f64 / sample_rate).round() as usize).min(nyquist_bin)
        };
        BandBins {
            low: bin(self.low),
            mid: bin(self.mid),
            high: bin(self.high),
        }
    }
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self {
            low: DEFAULT_THRESHOLDS[0],
            mid: DEFAULT_THRESHOLDS[1],
            high: DEFAULT_THRESHOLDS[2],
        }
    }
}

/// [`FrequencyBands`] expressed as FFT bin indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BandBins {
    pub low: usize,
    pub mid: usize,
    pub high: usize,
}

impl BandBins {
    /// Which of the four regions a bin falls in (0 = below `low`).
    #[inline]
    pub fn region(&self, bin: usize) -> usize {
        if bin < self.low {
            0
        } else if bin < self.mid {
            1
        } else if bin < self.high {
            2
        } else {
            3
        }
    }

    /// True for bins in the low or high extreme bands.
    #[inline]
    pub fn is_extreme(&self, bin: usize) -> bool {
        bin < self.low || bin >= self.mid
    }
}

/// Fully resolved configuration.
///
/// Every implied value is settled here: real-time forces precision on and
/// threading off, thresholds take their defaults, the window length follows
/// the sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchConfig {
    pub sample_rate: f64,
    pub channels: usize,
    pub realtime: bool,
    pub precise: bool,
    pub threading: ThreadingMode,
    pub transients: TransientMode,
    pub phase_locked: bool,
    pub softening: bool,
    pub window_size: WindowSize,

    /// Analysis window length in samples.
    pub window_length: usize,

    /// Quarter-window hop; the fixed side of the hop pair.
    pub hop_base: usize,

    pub bands: FrequencyBands,

    /// Onset fraction threshold for the transient detector.
    pub transient_sensitivity: f32,

    /// Maximum peak distance (bins) a bin may lock to, per band region.
    pub lock_widths: [usize; 4],

    pub debug_level: u8,
}

impl StretchConfig {
    /// Validate options for a sample rate and channel count.
    pub fn new(sample_rate: f64, channels: usize, options: &StretchOptions) -> Result<Self> {
        if channels < 1 {
            return Err(Error::Config("channel count must be at least 1".into()));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::Config(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if options.debug_level > StretchOptions::MAX_DEBUG_LEVEL {
            return Err(Error::Config(format!(
                "debug level must be between 0 and {}, got {}",
                StretchOptions::MAX_DEBUG_LEVEL,
                options.debug_level
            )));
        }

        let realtime = options.is_realtime();
        let threading = match (realtime, options.threading) {
            (true, ThreadingMode::Always) => {
                return Err(Error::Config(
                    "real-time mode cannot run with forced multi-threading".into(),
                ))
            }
            (true, _) => ThreadingMode::Never,
            (false, mode) => mode,
        };

        let bands = resolve_bands(&options.thresholds, sample_rate)?;
        let window_length = options.window.length_for(sample_rate);

        Ok(Self {
            sample_rate,
            channels,
            realtime,
            precise: realtime || options.precise,
            threading,
            transients: options.transients,
            phase_locked: options.phase == PhaseMode::Locked,
            softening: options.softening,
            window_size: options.window,
            window_length,
            hop_base: window_length / 4,
            bands,
            transient_sensitivity: DEFAULT_TRANSIENT_SENSITIVITY,
            lock_widths: [0, 1, 3, 2],
            debug_level: options.debug_level,
        })
    }

    /// Number of non-negative frequency bins.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.window_length / 2 + 1
    }

    /// Samples of start delay introduced by centring the first window on
    /// input sample zero.
    #[inline]
    pub fn latency(&self) -> usize {
        self.window_length / 2
    }

    /// Analysis hop for a time ratio.
    ///
    /// When stretching the synthesis hop stays at `hop_base` and the analysis
    /// hop shrinks; when compressing the analysis hop stays at `hop_base`.
    pub fn input_hop(&self, time_ratio: f64) -> usize {
        if time_ratio >= 1.0 {
            ((self.hop_base as f64 / time_ratio).round() as usize).max(1)
        } else {
            self.hop_base
        }
    }

    /// Largest synthesis hop the scheduler may hand out.
    #[inline]
    pub fn max_output_hop(&self) -> usize {
        self.window_length / 2
    }

    /// Band bins after optional softening for the given stretch magnitude.
    pub fn lock_bins(&self, stretch_magnitude: f64) -> BandBins {
        let bands = if self.softening {
            self.bands.softened(stretch_magnitude)
        } else {
            self.bands
        };
        bands.to_bins(self.window_length, self.sample_rate)
    }

    /// Unsoftened band bins, used by transient detection.
    pub fn transient_bins(&self) -> BandBins {
        self.bands.to_bins(self.window_length, self.sample_rate)
    }
}

fn resolve_bands(thresholds: &[Option<f32>; 3], sample_rate: f64) -> Result<FrequencyBands> {
    let nyquist = (sample_rate / 2.0) as f32;
    let mut edges = [0.0f32; 3];

    for (i, (slot, default)) in thresholds.iter().zip(DEFAULT_THRESHOLDS).enumerate() {
        edges[i] = match slot {
            Some(hz) if hz.is_finite() && *hz > 0.0 => *hz,
            Some(hz) => {
                return Err(Error::Config(format!(
                    "threshold {i} must be a positive frequency, got {hz}"
                )))
            }
            None => default.min(nyquist),
        };
    }

    if edges[0] > edges[1] || edges[1] > edges[2] {
        return Err(Error::Config(format!(
            "thresholds must be ascending, got {} / {} / {} Hz",
            edges[0], edges[1], edges[2]
        )));
    }

    Ok(FrequencyBands {
        low: edges[0],
        mid: edges[1],
        high: edges[2],
    })
}
