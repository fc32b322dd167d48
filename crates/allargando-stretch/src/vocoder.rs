//! Phase vocoder core for one channel.
//!
//! ## Algorithm Overview
//!
//! 1. **Analysis**: Hann-window the frame, FFT, split into magnitude and phase
//! 2. **Instantaneous frequency**: per-bin frequency from the phase advance
//!    over the previous analysis hop
//! 3. **Pitch**: move each spectral peak's region by a whole number of bins,
//!    keeping its shape, and scale frequencies by the ratio
//! 4. **Phase propagation**: advance each output phase by its frequency times
//!    the previous synthesis hop; transient frames reset to the analysis phase
//! 5. **Peak locking**: bins near a spectral peak keep the analysis phase
//!    offset to that peak, so partials stay coherent
//! 6. **Synthesis**: IFFT and synthesis window, ready for overlap-add
//!
//! All buffers are allocated up front; a frame performs no allocation.

use allargando_analysis::{bin_frequencies, polar_bins, wrap_phase, Complex32, SpectralTransform};
use allargando_core::{BandBins, StretchConfig};

use crate::plan::FramePlan;

/// Magnitudes below this are never treated as peaks.
const PEAK_FLOOR: f32 = 1e-6;

pub struct PhaseVocoder {
    transform: SpectralTransform,
    num_bins: usize,
    phase_locked: bool,
    lock_widths: [usize; 4],

    // Pre-allocated buffers
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    magnitudes: Vec<f32>,
    phases: Vec<f32>,
    prev_phases: Vec<f32>,
    bin_omega: Vec<f32>,
    frequencies: Vec<f32>,
    out_magnitudes: Vec<f32>,
    out_frequencies: Vec<f32>,
    out_phases: Vec<f32>,
    source_bins: Vec<usize>,
    reset_bins: Vec<bool>,
    peaks: Vec<usize>,

    /// (input hop, output hop) that followed the previous frame
    prev_hops: Option<(usize, usize)>,
}

impl PhaseVocoder {
    pub fn new(config: &StretchConfig, transform: SpectralTransform) -> Self {
        let size = transform.size();
        let num_bins = transform.num_bins();
        let scratch_len = transform.scratch_len();

        Self {
            bin_omega: bin_frequencies(size),
            transform,
            num_bins,
            phase_locked: config.phase_locked,
            lock_widths: config.lock_widths,
            spectrum: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; num_bins],
            phases: vec![0.0; num_bins],
            prev_phases: vec![0.0; num_bins],
            frequencies: vec![0.0; num_bins],
            out_magnitudes: vec![0.0; num_bins],
            out_frequencies: vec![0.0; num_bins],
            out_phases: vec![0.0; num_bins],
            source_bins: (0..num_bins).collect(),
            reset_bins: vec![false; num_bins],
            peaks: Vec::with_capacity(num_bins / 2 + 1),
            prev_hops: None,
        }
    }

    #[inline]
    pub fn window(&self) -> &[f32] {
        self.transform.window()
    }

    /// Magnitudes of the last analysed frame.
    #[inline]
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Window and transform one frame of `window_length` samples.
    pub fn analyse(&mut self, frame: &[f32]) {
        self.transform
            .forward(frame, &mut self.spectrum, &mut self.scratch);
        polar_bins(&self.spectrum, &mut self.magnitudes, &mut self.phases);
    }

    /// Build the synthesis frame for the last analysed frame.
    ///
    /// `resets(bin)` says which bins a transient resets. `out` receives the
    /// windowed time-domain frame.
    pub fn synthesise(
        &mut self,
        plan: &FramePlan,
        transient: bool,
        resets: impl Fn(usize) -> bool,
        out: &mut [f32],
    ) {
        self.estimate_frequencies();
        self.remap_bins(plan.pitch);
        self.propagate_phases(transient, resets);
        if self.phase_locked {
            self.lock_to_peaks(&plan.lock_bins);
        }

        std::mem::swap(&mut self.prev_phases, &mut self.phases);
        self.prev_hops = Some((plan.input_hop, plan.output_hop));

        for (bin, (&mag, &phase)) in self
            .spectrum
            .iter_mut()
            .zip(self.out_magnitudes.iter().zip(&self.out_phases))
        {
            *bin = Complex32::from_polar(mag, phase);
        }
        self.transform
            .inverse(&mut self.spectrum, &mut self.scratch, out);
    }

    /// Take the next frame's phases straight from its analysis.
    ///
    /// Used while the window still covers start padding or silence, whose
    /// phases would otherwise be carried through the rest of the stream.
    pub fn reseed(&mut self) {
        self.prev_hops = None;
    }

    pub fn reset(&mut self) {
        self.prev_phases.fill(0.0);
        self.out_phases.fill(0.0);
        self.prev_hops = None;
    }

    fn estimate_frequencies(&mut self) {
        match self.prev_hops {
            Some((input_hop, _)) => {
                let hop = input_hop as f32;
                for k in 0..self.num_bins {
                    let omega = self.bin_omega[k];
                    let deviation = wrap_phase(self.phases[k] - self.prev_phases[k] - omega * hop);
                    self.frequencies[k] = omega + deviation / hop;
                }
            }
            None => self.frequencies.copy_from_slice(&self.bin_omega),
        }
    }

    fn remap_bins(&mut self, pitch: f32) {
        if (pitch - 1.0).abs() <= f32::EPSILON {
            self.out_magnitudes.copy_from_slice(&self.magnitudes);
            self.out_frequencies.copy_from_slice(&self.frequencies);
            for (i, src) in self.source_bins.iter_mut().enumerate() {
                *src = i;
            }
            return;
        }

        self.out_magnitudes.fill(0.0);
        self.out_frequencies.copy_from_slice(&self.bin_omega);
        for (i, src) in self.source_bins.iter_mut().enumerate() {
            *src = i;
        }

        find_peaks(&self.magnitudes, &mut self.peaks);
        let spacing = self.bin_omega[1];
        let last = self.num_bins - 1;

        for (n, &peak) in self.peaks.iter().enumerate() {
            // a region runs halfway to each neighbouring peak
            let lo = if n == 0 { 0 } else { (self.peaks[n - 1] + peak) / 2 + 1 };
            let hi = self.peaks.get(n + 1).map_or(last, |&next| (peak + next) / 2);
            let shift = (self.frequencies[peak] * (pitch - 1.0) / spacing).round() as isize;

            for source in lo..=hi {
                let target = source as isize + shift;
                if target < 0 || target > last as isize {
                    continue;
                }
                let target = target as usize;
                // overlapping regions keep the louder bin
                if self.magnitudes[source] > self.out_magnitudes[target] {
                    self.out_magnitudes[target] = self.magnitudes[source];
                    self.out_frequencies[target] = self.frequencies[source] * pitch;
                    self.source_bins[target] = source;
                }
            }
        }
    }

    fn propagate_phases(&mut self, transient: bool, resets: impl Fn(usize) -> bool) {
        let output_hop = match self.prev_hops {
            Some((_, output_hop)) => output_hop as f32,
            None => {
                // first frame: adopt the analysis phases outright
                for i in 0..self.num_bins {
                    self.out_phases[i] = self.phases[self.source_bins[i]];
                    self.reset_bins[i] = true;
                }
                return;
            }
        };

        for i in 0..self.num_bins {
            let reset = transient && resets(i);
            self.reset_bins[i] = reset;
            self.out_phases[i] = if reset {
                self.phases[self.source_bins[i]]
            } else {
                wrap_phase(self.out_phases[i] + self.out_frequencies[i] * output_hop)
            };
        }
    }

    fn lock_to_peaks(&mut self, bands: &BandBins) {
        find_peaks(&self.out_magnitudes, &mut self.peaks);
        if self.peaks.is_empty() {
            return;
        }

        let mut nearest = 0;
        for i in 0..self.num_bins {
            while nearest + 1 < self.peaks.len()
                && self.peaks[nearest + 1].abs_diff(i) <= self.peaks[nearest].abs_diff(i)
            {
                nearest += 1;
            }
            let peak = self.peaks[nearest];
            if peak == i || self.reset_bins[i] {
                continue;
            }
            let width = self.lock_widths[bands.region(i)];
            if peak.abs_diff(i) > width {
                continue;
            }
            let offset = self.phases[self.source_bins[i]] - self.phases[self.source_bins[peak]];
            self.out_phases[i] = wrap_phase(self.out_phases[peak] + offset);
        }
    }
}

/// Local maxima above the floor, edges included.
fn find_peaks(magnitudes: &[f32], peaks: &mut Vec<usize>) {
    peaks.clear();
    let len = magnitudes.len();
    for i in 0..len {
        let mag = magnitudes[i];
        if mag <= PEAK_FLOOR {
            continue;
        }
        let above_left = i == 0 || mag > magnitudes[i - 1];
        let above_right = i + 1 == len || mag >= magnitudes[i + 1];
        if above_left && above_right {
            peaks.push(i);
        }
    }
}
