//! Per-channel processing state.
//!
//! Each channel owns its input queue, vocoder, transient detector, overlap-add
//! accumulator and output queue. Channels share nothing mutable, so a whole
//! `ChannelState` can be moved to a worker thread for a batch of frames and
//! moved back afterwards.

use allargando_analysis::{SpectralTransform, TransientDetector};
use allargando_core::{SampleQueue, StretchConfig};

use crate::plan::FramePlan;
use crate::vocoder::PhaseVocoder;

/// Overlap sums below this are not trusted for normalisation.
const WINDOW_SUM_FLOOR: f32 = 0.1;

/// Length of the debug click in samples.
const TICK_LENGTH: usize = 64;

/// Frames whose loudest bin is below this carry no signal.
const SILENT_MAGNITUDE: f32 = 1e-6;

pub struct ChannelState {
    index: usize,
    window_length: usize,
    latency: usize,
    vocoder: PhaseVocoder,
    detector: TransientDetector,
    input: SampleQueue,
    output: SampleQueue,
    frame: Vec<f32>,
    synthesis: Vec<f32>,
    accumulator: Vec<f32>,
    window_sums: Vec<f32>,
    /// Output samples still to drop for the start delay
    start_skip: usize,
    /// Leading samples of the current window known to hold no signal
    lead_in: usize,
    /// The previous frame took its phases from analysis
    reseeded: bool,
    /// Samples pushed to the output queue so far
    emitted: u64,
    /// Total output this channel may produce, once known
    limit: Option<u64>,
    debug_ticks: bool,
    transients: usize,
}

impl ChannelState {
    pub fn new(index: usize, config: &StretchConfig, transform: SpectralTransform) -> Self {
        let n = config.window_length;
        let mut channel = Self {
            index,
            window_length: n,
            latency: config.latency(),
            vocoder: PhaseVocoder::new(config, transform),
            detector: TransientDetector::new(config),
            input: SampleQueue::growable(n * 2),
            output: SampleQueue::growable(n * 4),
            frame: vec![0.0; n],
            synthesis: vec![0.0; n],
            accumulator: vec![0.0; n],
            window_sums: vec![0.0; n],
            start_skip: 0,
            lead_in: 0,
            reseeded: false,
            emitted: 0,
            limit: None,
            debug_ticks: config.debug_level >= 3,
            transients: 0,
        };
        channel.prime();
        channel
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Samples waiting for analysis, including the start padding.
    #[inline]
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Samples ready for retrieval.
    #[inline]
    pub fn available(&self) -> usize {
        self.output.len()
    }

    /// Transient frames seen so far.
    #[inline]
    pub fn transients(&self) -> usize {
        self.transients
    }

    pub fn push_input(&mut self, samples: &[f32]) {
        self.input.push(samples);
    }

    /// Cap the total output; later frames only fill up to this point.
    pub fn set_output_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    /// Pre-size the output queue for `frames` more samples.
    pub fn reserve_output(&mut self, frames: usize) {
        self.output.reserve(frames);
    }

    #[inline]
    pub fn output_capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Move up to `dest.len()` ready samples into `dest`.
    pub fn retrieve(&mut self, dest: &mut [f32]) -> usize {
        self.output.pop(dest)
    }

    /// Run a batch of frames.
    pub fn run(&mut self, plans: &[FramePlan]) {
        for plan in plans {
            self.process_frame(plan);
        }
    }

    pub fn reset(&mut self) {
        self.vocoder.reset();
        self.detector.reset();
        self.input.clear();
        self.output.clear();
        self.accumulator.fill(0.0);
        self.window_sums.fill(0.0);
        self.emitted = 0;
        self.limit = None;
        self.transients = 0;
        self.reseeded = false;
        self.prime();
    }

    /// Centre the first window on input sample zero.
    fn prime(&mut self) {
        self.input.push_zeros(self.latency);
        self.start_skip = self.latency;
        self.lead_in = self.latency;
    }

    fn process_frame(&mut self, plan: &FramePlan) {
        let got = self.input.peek(&mut self.frame);
        self.frame[got..].fill(0.0);

        self.vocoder.analyse(&self.frame);
        let silent = self
            .vocoder
            .magnitudes()
            .iter()
            .all(|&m| m <= SILENT_MAGNITUDE);
        if silent {
            self.lead_in = self.window_length;
        }
        // reseed until the first frame that is all signal
        if self.lead_in > 0 || self.reseeded {
            self.vocoder.reseed();
        }
        self.reseeded = self.lead_in > 0;

        let detected = self.detector.detect(self.vocoder.magnitudes());
        let transient = plan.transient.unwrap_or(detected);
        if transient {
            self.transients += 1;
        }

        let detector = &self.detector;
        self.vocoder
            .synthesise(plan, transient, |bin| detector.resets(bin), &mut self.synthesis);

        if self.debug_ticks && transient {
            add_tick(&mut self.synthesis);
        }

        let window = self.vocoder.window();
        for i in 0..self.window_length {
            self.accumulator[i] += self.synthesis[i];
            self.window_sums[i] += window[i] * window[i];
        }

        self.emit(plan.output_hop);
        self.input.discard(plan.input_hop);
        self.lead_in = self.lead_in.saturating_sub(plan.input_hop);
    }

    /// Normalise and move the first `count` accumulated samples out.
    fn emit(&mut self, count: usize) {
        let n = self.window_length;
        let count = count.min(n);

        for (sample, &sum) in self.accumulator[..count]
            .iter_mut()
            .zip(&self.window_sums[..count])
        {
            *sample /= sum.max(WINDOW_SUM_FLOOR);
        }

        let skip = self.start_skip.min(count);
        self.start_skip -= skip;

        let ready = &self.accumulator[skip..count];
        let allowed = match self.limit {
            Some(limit) => limit.saturating_sub(self.emitted).min(ready.len() as u64) as usize,
            None => ready.len(),
        };
        self.output.push(&ready[..allowed]);
        self.emitted += allowed as u64;

        self.accumulator.copy_within(count.., 0);
        self.accumulator[n - count..].fill(0.0);
        self.window_sums.copy_within(count.., 0);
        self.window_sums[n - count..].fill(0.0);
    }
}

/// Mix an audible decaying click at the frame centre.
fn add_tick(frame: &mut [f32]) {
    let centre = frame.len() / 2;
    for (i, sample) in frame[centre..].iter_mut().take(TICK_LENGTH).enumerate() {
        let envelope = 1.0 - i as f32 / TICK_LENGTH as f32;
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        *sample += 0.5 * envelope * sign;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allargando_core::{StretchOptions, TransientMode};

    fn channel(options: &StretchOptions) -> (ChannelState, StretchConfig) {
        let config = StretchConfig::new(48000.0, 1, options).unwrap();
        let transform = SpectralTransform::new(config.window_length);
        (ChannelState::new(0, &config, transform), config)
    }

    fn plans(config: &StretchConfig, count: usize, input_hop: usize, output_hop: usize) -> Vec<FramePlan> {
        (0..count)
            .map(|index| FramePlan {
                index,
                input_hop,
                output_hop,
                pitch: 1.0,
                lock_bins: config.lock_bins(1.0),
                transient: Some(false),
            })
            .collect()
    }

    #[test]
    fn test_primed_with_start_padding() {
        let (ch, config) = channel(&StretchOptions::default());
        assert_eq!(ch.input_len(), config.latency());
        assert_eq!(ch.available(), 0);
    }

    #[test]
    fn test_unity_reconstructs_input() {
        let (mut ch, config) = channel(&StretchOptions::default());
        let hop = config.hop_base;
        let input: Vec<f32> = (0..20_000)
            .map(|i| (i as f32 * 0.031).sin() * 0.4)
            .collect();
        ch.push_input(&input);

        let frames = (ch.input_len() - config.window_length) / hop + 1;
        ch.run(&plans(&config, frames, hop, hop));

        // first hop is consumed entirely by the start delay
        let produced = frames * hop - config.latency();
        assert_eq!(ch.available(), produced);

        let mut out = vec![0.0; produced];
        ch.retrieve(&mut out);
        for i in 0..produced {
            assert!((out[i] - input[i]).abs() < 1e-3, "sample {i}: {} vs {}", out[i], input[i]);
        }
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Stretch 4x and return everything produced.
    fn stretch_4x(ch: &mut ChannelState, config: &StretchConfig, input: &[f32]) -> Vec<f32> {
        ch.push_input(input);
        let frames = (ch.input_len() - config.window_length) / 128 + 1;
        ch.run(&plans(config, frames, 128, 512));
        let mut out = vec![0.0; ch.available()];
        ch.retrieve(&mut out);
        out
    }

    #[test]
    fn test_stretched_tone_keeps_level() {
        let (mut ch, config) = channel(&StretchOptions::default());
        let input = tone(40_000);
        let out = stretch_4x(&mut ch, &config, &input);

        let level = rms(&out[out.len() / 4..3 * out.len() / 4]) / rms(&input);
        assert!((0.89..1.12).contains(&level), "level {level}");
    }

    #[test]
    fn test_tone_after_silence_keeps_level() {
        let (mut ch, config) = channel(&StretchOptions::default());
        let mut input = vec![0.0; 10_000];
        input.extend(tone(30_000));
        let out = stretch_4x(&mut ch, &config, &input);

        // the tone starts at output sample 40000
        let level = rms(&out[60_000..out.len() - 10_000]) / rms(&input[10_000..]);
        assert!((0.89..1.12).contains(&level), "level {level}");
    }

    #[test]
    fn test_output_limit_caps_emission() {
        let (mut ch, config) = channel(&StretchOptions::default());
        let hop = config.hop_base;
        ch.push_input(&vec![0.2; 8192]);
        ch.set_output_limit(1000);
        ch.run(&plans(&config, 20, hop, hop));
        assert_eq!(ch.available(), 1000);
    }

    #[test]
    fn test_study_decision_overrides_detector() {
        let (mut ch, config) = channel(&StretchOptions::default().transients(TransientMode::Full));
        let hop = config.hop_base;
        let mut input = vec![0.0; 8192];
        input[4096] = 1.0;
        ch.push_input(&input);

        // the study pass said no transients anywhere
        ch.run(&plans(&config, 10, hop, hop));
        assert_eq!(ch.transients(), 0);

        let mut undecided = plans(&config, 1, hop, hop);
        undecided[0].transient = Some(true);
        ch.run(&undecided);
        assert_eq!(ch.transients(), 1);
    }

    #[test]
    fn test_debug_ticks_are_added_on_transients() {
        let (mut quiet, config) = channel(&StretchOptions::default());
        let (mut ticking, _) = channel(&StretchOptions::default().debug_level(3));
        let hop = config.hop_base;
        for ch in [&mut quiet, &mut ticking] {
            ch.push_input(&vec![0.0; 8192]);
            let mut p = plans(&config, 12, hop, hop);
            p[6].transient = Some(true);
            ch.run(&p);
        }
        let energy = |ch: &mut ChannelState| {
            let mut out = vec![0.0; ch.available()];
            ch.retrieve(&mut out);
            out.iter().map(|s| s * s).sum::<f32>()
        };
        assert!(energy(&mut quiet) < 1e-9);
        assert!(energy(&mut ticking) > 0.01);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let (mut ch, config) = channel(&StretchOptions::default());
        ch.push_input(&vec![0.3; 6000]);
        ch.run(&plans(&config, 4, config.hop_base, config.hop_base));
        ch.set_output_limit(10);
        ch.reset();
        assert_eq!(ch.input_len(), config.latency());
        assert_eq!(ch.available(), 0);
        assert_eq!(ch.transients(), 0);
    }
}
