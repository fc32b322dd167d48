//! Study-pass analysis.
//!
//! [`ProfileBuilder`] consumes the whole input once (offline mode only),
//! analysing a mono mixdown on the same frame grid the processing pass will
//! use. The resulting [`AnalysisProfile`] drives transient phase resets and
//! the elastic distribution of stretch across frames.

use allargando_core::{SampleQueue, StretchConfig};
use rustfft::num_complex::Complex32;

use crate::spectrum::{polar_bins, SpectralTransform};
use crate::transient::TransientDetector;

/// Mean-square level below which a frame counts as quiet.
const QUIET_ENERGY: f32 = 1e-6;

/// Features of one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameFeatures {
    /// Fraction of bins rising by more than 3 dB (0.0 - 1.0)
    pub onset: f32,
    /// Whether the frame was classified as a transient
    pub transient: bool,
    /// Mean-square level of the unwindowed frame
    pub energy: f32,
}

impl FrameFeatures {
    #[inline]
    pub fn is_quiet(&self) -> bool {
        self.energy < QUIET_ENERGY
    }
}

/// Per-frame features of a fully studied input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisProfile {
    hop: usize,
    input_frames: u64,
    frames: Vec<FrameFeatures>,
}

impl AnalysisProfile {
    pub fn new(hop: usize, input_frames: u64, frames: Vec<FrameFeatures>) -> Self {
        Self {
            hop,
            input_frames,
            frames,
        }
    }

    /// Analysis hop the profile was built with.
    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Total input frames (samples per channel) studied.
    #[inline]
    pub fn input_frames(&self) -> u64 {
        self.input_frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frame(&self, index: usize) -> Option<&FrameFeatures> {
        self.frames.get(index)
    }

    #[inline]
    pub fn frames(&self) -> &[FrameFeatures] {
        &self.frames
    }

    /// Indices of transient frames.
    pub fn transient_frames(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.transient)
            .map(|(i, _)| i)
    }

    pub fn transient_count(&self) -> usize {
        self.transient_frames().count()
    }
}

/// Incremental builder for an [`AnalysisProfile`].
pub struct ProfileBuilder {
    transform: SpectralTransform,
    detector: TransientDetector,
    hop: usize,
    channels: usize,
    mixdown: SampleQueue,
    mix_block: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    magnitudes: Vec<f32>,
    phases: Vec<f32>,
    input_frames: u64,
    /// Input position of the next frame's centre
    centre: u64,
    frames: Vec<FrameFeatures>,
    finished: bool,
}

impl ProfileBuilder {
    /// Builder analysing with `hop` samples between frames.
    ///
    /// Frames are centred on the same input positions as the processing pass:
    /// the first window is centred on sample zero.
    pub fn new(config: &StretchConfig, transform: SpectralTransform, hop: usize) -> Self {
        let size = transform.size();
        let num_bins = transform.num_bins();
        let scratch_len = transform.scratch_len();

        let mut mixdown = SampleQueue::growable(size * 2);
        mixdown.push_zeros(config.latency());

        Self {
            detector: TransientDetector::new(config),
            transform,
            hop: hop.max(1),
            channels: config.channels,
            mixdown,
            mix_block: Vec::new(),
            frame: vec![0.0; size],
            spectrum: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; num_bins],
            phases: vec![0.0; num_bins],
            input_frames: 0,
            centre: 0,
            frames: Vec::new(),
            finished: false,
        }
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    #[inline]
    pub fn input_frames(&self) -> u64 {
        self.input_frames
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one block (one slice per channel, equal lengths).
    pub fn feed<S: AsRef<[f32]>>(&mut self, block: &[S], final_block: bool) {
        if self.finished {
            return;
        }

        let frames = block.first().map_or(0, |c| c.as_ref().len());
        self.mix_block.clear();
        self.mix_block.resize(frames, 0.0);
        let gain = 1.0 / self.channels.max(1) as f32;
        for channel in block {
            for (mix, &sample) in self.mix_block.iter_mut().zip(channel.as_ref()) {
                *mix += sample * gain;
            }
        }

        self.mixdown.push(&self.mix_block);
        self.input_frames += frames as u64;
        self.finished = final_block;
        self.analyse_ready();
    }

    /// Close the study pass and return the profile.
    pub fn finish(mut self) -> AnalysisProfile {
        if !self.finished {
            self.finished = true;
            self.analyse_ready();
        }
        AnalysisProfile::new(self.hop, self.input_frames, self.frames)
    }

    fn analyse_ready(&mut self) {
        let size = self.frame.len();
        loop {
            let ready = if self.finished {
                self.centre < self.input_frames
            } else {
                self.mixdown.len() >= size
            };
            if !ready {
                break;
            }
            self.analyse_frame();
            self.mixdown.discard(self.hop);
            self.centre += self.hop as u64;
        }
    }

    fn analyse_frame(&mut self) {
        let got = self.mixdown.peek(&mut self.frame);
        self.frame[got..].fill(0.0);

        let energy =
            self.frame.iter().map(|s| s * s).sum::<f32>() / self.frame.len().max(1) as f32;

        self.transform
            .forward(&self.frame, &mut self.spectrum, &mut self.scratch);
        polar_bins(&self.spectrum, &mut self.magnitudes, &mut self.phases);
        let (onset, transient) = self.detector.analyse(&self.magnitudes);

        self.frames.push(FrameFeatures {
            onset,
            transient,
            energy,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allargando_core::StretchOptions;

    fn builder(hop: usize) -> ProfileBuilder {
        let config = StretchConfig::new(48000.0, 2, &StretchOptions::default()).unwrap();
        let transform = SpectralTransform::new(config.window_length);
        ProfileBuilder::new(&config, transform, hop)
    }

    #[test]
    fn test_frame_grid_covers_input() {
        let mut b = builder(512);
        let left = vec![0.0f32; 10_000];
        let right = vec![0.0f32; 10_000];
        b.feed(&[&left[..], &right[..]], true);
        let profile = b.finish();

        // centres at 0, 512, ... up to the last one before 10000
        assert_eq!(profile.len(), 10_000usize.div_ceil(512));
        assert_eq!(profile.input_frames(), 10_000);
        assert_eq!(profile.hop(), 512);
        assert!(profile.frames().iter().all(|f| f.is_quiet()));
        assert_eq!(profile.transient_count(), 0);
    }

    #[test]
    fn test_incremental_feed_matches_single_feed() {
        let signal: Vec<f32> = (0..8000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();

        let mut whole = builder(256);
        whole.feed(&[&signal[..], &signal[..]], true);
        let whole = whole.finish();

        let mut pieces = builder(256);
        for chunk in signal.chunks(1000) {
            pieces.feed(&[chunk, chunk], false);
        }
        let pieces = pieces.finish();

        assert_eq!(whole.len(), pieces.len());
        for (a, b) in whole.frames().iter().zip(pieces.frames()) {
            assert!((a.energy - b.energy).abs() < 1e-6);
            assert_eq!(a.transient, b.transient);
        }
    }

    #[test]
    fn test_click_after_silence_is_transient() {
        let mut signal = vec![0.0f32; 24_000];
        signal[12_000] = 1.0;
        let mut b = builder(512);
        b.feed(&[&signal[..], &signal[..]], true);
        let profile = b.finish();

        let transients: Vec<usize> = profile.transient_frames().collect();
        assert!(!transients.is_empty());
        // the first flagged frame's window reaches the click
        let first = transients[0] as u64 * 512;
        assert!(first + 1024 >= 12_000 && first <= 12_000 + 1024, "{first}");
    }

    #[test]
    fn test_empty_input() {
        let mut b = builder(512);
        let empty: [&[f32]; 2] = [&[], &[]];
        b.feed(&empty, true);
        let profile = b.finish();
        assert!(profile.is_empty());
        assert_eq!(profile.input_frames(), 0);
    }

    #[test]
    fn test_feed_after_final_is_ignored() {
        let mut b = builder(512);
        let block = vec![0.1f32; 2000];
        b.feed(&[&block[..], &block[..]], true);
        b.feed(&[&block[..], &block[..]], false);
        assert_eq!(b.input_frames(), 2000);
        assert!(b.is_finished());
    }
}
