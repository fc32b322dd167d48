//! Time and frequency ratios.

use crate::error::{Error, Result};

/// Convert a pitch shift in semitones to a frequency ratio: `2^(semitones/12)`.
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Time and frequency scale factors.
///
/// - `time`: output duration relative to input (2.0 = twice as long)
/// - `frequency`: pitch scale (2.0 = one octave up)
///
/// Both must be finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratios {
    pub time: f64,
    pub frequency: f64,
}

impl Ratios {
    /// Below this distance from 1.0 a ratio is treated as unity.
    pub const UNITY_EPSILON: f64 = 1e-9;

    pub fn new(time: f64, frequency: f64) -> Result<Self> {
        Ok(Self {
            time: check_ratio("time", time)?,
            frequency: check_ratio("frequency", frequency)?,
        })
    }

    /// Combined ratio used to judge how hard the vocoder is working.
    pub fn effective(&self) -> f64 {
        self.time * self.frequency
    }

    /// Distance from unity in either direction, always `>= 1.0`.
    pub fn stretch_magnitude(&self) -> f64 {
        let r = self.effective();
        if r >= 1.0 {
            r
        } else {
            1.0 / r
        }
    }

    /// True when the frequency ratio requests any pitch change.
    pub fn is_pitch_shifted(&self) -> bool {
        (self.frequency - 1.0).abs() > Self::UNITY_EPSILON
    }
}

impl Default for Ratios {
    fn default() -> Self {
        Self {
            time: 1.0,
            frequency: 1.0,
        }
    }
}

/// Validate a single ratio value.
pub fn check_ratio(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{name} ratio must be finite and positive, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_semitones_to_ratio() {
        assert_relative_eq!(semitones_to_ratio(12.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(semitones_to_ratio(-12.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(semitones_to_ratio(0.0), 1.0);
        assert_relative_eq!(semitones_to_ratio(7.0), 1.498_307, epsilon = 1e-6);
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratios::new(2.0, 1.0).is_ok());
        assert!(Ratios::new(0.0, 1.0).unwrap_err().is_config());
        assert!(Ratios::new(1.0, -1.0).unwrap_err().is_config());
        assert!(Ratios::new(f64::NAN, 1.0).is_err());
        assert!(Ratios::new(1.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_stretch_magnitude() {
        let r = Ratios::new(0.5, 1.0).unwrap();
        assert_relative_eq!(r.stretch_magnitude(), 2.0);
        let r = Ratios::new(2.0, 1.5).unwrap();
        assert_relative_eq!(r.stretch_magnitude(), 3.0);
        assert!(r.is_pitch_shifted());
        assert!(!Ratios::default().is_pitch_shifted());
    }
}
