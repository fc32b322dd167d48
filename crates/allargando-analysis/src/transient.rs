//! Per-frame transient detection.
//!
//! Percussive onset metric: the fraction of considered bins whose magnitude
//! rose by more than 3 dB since the previous frame. A frame is transient when
//! the fraction exceeds the sensitivity, is still rising, and the previous
//! frame was not already flagged.
//!
//! Which bins are considered, and which bins receive a phase reset, depends on
//! [`TransientMode`]:
//!
//! - `Full`: every bin up to the `high` edge feeds the metric; every bin resets
//! - `BandLimited`: only bins outside the low/mid crossover region count and reset
//! - `None`: the metric still runs (the study pass reads it) but nothing is flagged

use allargando_core::{BandBins, StretchConfig, TransientMode};

/// Power ratio of +3 dB expressed as a magnitude ratio.
const RISE_RATIO: f32 = 1.412_537_5;

/// Magnitudes below this are treated as silence and never count as rising.
const MAGNITUDE_FLOOR: f32 = 1e-3;

/// Transient detector for one channel (or the study mixdown).
#[derive(Debug, Clone)]
pub struct TransientDetector {
    /// Detection mode
    mode: TransientMode,
    /// Band edges in bins (unsoftened)
    bins: BandBins,
    /// Onset fraction threshold (0.0 - 1.0)
    sensitivity: f32,
    /// Previous magnitude spectrum
    prev_magnitudes: Vec<f32>,
    /// Onset fraction of the previous frame
    prev_onset: f32,
    /// Whether the previous frame was flagged
    last_was_transient: bool,
}

impl TransientDetector {
    pub fn new(config: &StretchConfig) -> Self {
        Self::with_bands(
            config.transients,
            config.transient_bins(),
            config.num_bins(),
            config.transient_sensitivity,
        )
    }

    pub fn with_bands(
        mode: TransientMode,
        bins: BandBins,
        num_bins: usize,
        sensitivity: f32,
    ) -> Self {
        Self {
            mode,
            bins,
            sensitivity: sensitivity.clamp(0.0, 1.0),
            prev_magnitudes: vec![0.0; num_bins],
            prev_onset: 0.0,
            last_was_transient: false,
        }
    }

    /// True if `bin` contributes to the onset metric.
    #[inline]
    pub fn considers(&self, bin: usize) -> bool {
        considered(self.mode, &self.bins, bin)
    }

    /// True if a transient frame resets the phase of `bin`.
    #[inline]
    pub fn resets(&self, bin: usize) -> bool {
        match self.mode {
            TransientMode::None => false,
            TransientMode::BandLimited => self.bins.is_extreme(bin),
            TransientMode::Full => true,
        }
    }

    /// Onset fraction of `magnitudes` relative to the previous frame.
    ///
    /// Updates the magnitude history.
    pub fn onset(&mut self, magnitudes: &[f32]) -> f32 {
        let (mode, bins) = (self.mode, self.bins);
        let mut counted = 0usize;
        let mut rising = 0usize;

        for (bin, (&mag, prev)) in magnitudes
            .iter()
            .zip(self.prev_magnitudes.iter_mut())
            .enumerate()
        {
            if considered(mode, &bins, bin) {
                counted += 1;
                if mag > MAGNITUDE_FLOOR && mag > *prev * RISE_RATIO {
                    rising += 1;
                }
            }
            *prev = mag;
        }

        if counted == 0 {
            0.0
        } else {
            rising as f32 / counted as f32
        }
    }

    /// Classify the next frame.
    pub fn detect(&mut self, magnitudes: &[f32]) -> bool {
        self.analyse(magnitudes).1
    }

    /// Onset fraction plus classification, for the study pass.
    pub fn analyse(&mut self, magnitudes: &[f32]) -> (f32, bool) {
        let onset = self.onset(magnitudes);
        let hit = self.classify(onset);
        self.prev_onset = onset;
        self.last_was_transient = hit;
        (onset, hit)
    }

    pub fn reset(&mut self) {
        self.prev_magnitudes.fill(0.0);
        self.prev_onset = 0.0;
        self.last_was_transient = false;
    }

    fn classify(&self, onset: f32) -> bool {
        self.mode != TransientMode::None
            && onset > self.sensitivity
            && onset > self.prev_onset
            && !self.last_was_transient
    }
}

fn considered(mode: TransientMode, bins: &BandBins, bin: usize) -> bool {
    if bin == 0 || bin > bins.high {
        return false;
    }
    match mode {
        TransientMode::BandLimited => bins.is_extreme(bin),
        TransientMode::Full | TransientMode::None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins() -> BandBins {
        BandBins {
            low: 10,
            mid: 20,
            high: 100,
        }
    }

    fn detector(mode: TransientMode) -> TransientDetector {
        TransientDetector::with_bands(mode, bins(), 129, 0.35)
    }

    #[test]
    fn test_silence_is_not_transient() {
        let mut det = detector(TransientMode::Full);
        let silence = vec![0.0; 129];
        for _ in 0..4 {
            assert!(!det.detect(&silence));
        }
    }

    #[test]
    fn test_broadband_onset_is_transient_once() {
        let mut det = detector(TransientMode::Full);
        let quiet = vec![0.0; 129];
        let loud = vec![1.0; 129];

        assert!(!det.detect(&quiet));
        assert!(det.detect(&loud));
        // a sustained level does not rise again
        assert!(!det.detect(&loud));
        assert!(!det.detect(&loud));
    }

    #[test]
    fn test_consecutive_frames_are_not_both_flagged() {
        let mut det = detector(TransientMode::Full);
        let mut level = 0.01;
        let mut flags = Vec::new();
        for _ in 0..6 {
            level *= 4.0;
            flags.push(det.detect(&vec![level; 129]));
        }
        for pair in flags.windows(2) {
            assert!(!(pair[0] && pair[1]), "flags: {flags:?}");
        }
        assert!(flags.iter().any(|&f| f));
    }

    #[test]
    fn test_none_mode_measures_but_never_flags() {
        let mut det = detector(TransientMode::None);
        let (onset, hit) = det.analyse(&vec![1.0; 129]);
        assert!(onset > 0.9);
        assert!(!hit);
        assert!(!det.resets(5));
    }

    #[test]
    fn test_band_limited_ignores_mid_band() {
        let mut det = detector(TransientMode::BandLimited);
        det.detect(&vec![0.0; 129]);

        // energy only in the mid band
        let mut mid_only = vec![0.0; 129];
        for m in &mut mid_only[10..20] {
            *m = 1.0;
        }
        assert!(!det.detect(&mid_only));

        assert!(det.considers(3));
        assert!(!det.considers(15));
        assert!(det.considers(50));
        assert!(!det.considers(0));
        assert!(!det.considers(120));

        assert!(det.resets(3));
        assert!(!det.resets(15));
        assert!(det.resets(120));
    }

    #[test]
    fn test_full_mode_resets_every_bin() {
        let det = detector(TransientMode::Full);
        assert!((0..129).all(|b| det.resets(b)));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut det = detector(TransientMode::Full);
        det.detect(&vec![0.0; 129]);
        assert!(det.detect(&vec![1.0; 129]));
        det.reset();
        assert!(det.detect(&vec![1.0; 129]));
    }
}
