//! The streaming [`Stretcher`] facade.
//!
//! ```text
//! Created -> [Studying]* -> Processing -> Draining -> Finished
//! ```
//!
//! - `study` (offline only) feeds the whole input once to build an analysis
//!   profile; it produces no output.
//! - `process` feeds blocks; once enough input is queued for a window, frames
//!   are scheduled on the calling thread and run on every channel, inline or
//!   on the worker pool.
//! - `final_block = true` fixes the total output length and zero-pads the
//!   remaining frames; the stream then drains through `available`/`retrieve`
//!   until `available` returns `None`.

use std::sync::Arc;

use allargando_analysis::{AnalysisProfile, ProfileBuilder, SpectralTransform, StretchCalculator};
use allargando_core::{
    check_ratio, BandBins, Error as CoreError, Ratios, StretchConfig, StretchOptions,
};

use crate::channel::ChannelState;
use crate::error::Result;
use crate::plan::FramePlan;
use crate::signal::AvailabilitySignal;
use crate::threading::Dispatcher;

/// Windows of output the expected-duration hint pre-sizes queues for.
const OUTPUT_WINDOWS: usize = 4;

/// Lifecycle of a stretcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StretcherState {
    Created,
    Studying,
    Processing,
    Draining,
    Finished,
}

/// Phase-vocoder time-stretcher and pitch-shifter.
///
/// One instance handles one multi-channel stream. Calls must come from a
/// single thread at a time; the optional worker pool is internal.
pub struct Stretcher {
    config: StretchConfig,
    ratios: Ratios,
    state: StretcherState,
    transform: SpectralTransform,
    channels: Vec<Box<ChannelState>>,
    dispatcher: Dispatcher,
    calculator: StretchCalculator,
    study: Option<ProfileBuilder>,
    study_closed: bool,
    profile: Option<AnalysisProfile>,
    input_hop: usize,
    lock_bins: BandBins,
    /// Frames per channel supplied to `process` so far
    input_frames: u64,
    expected_input: Option<usize>,
    /// Total output frames, fixed by the final block
    output_target: Option<u64>,
    complete: bool,
    plans: Arc<Vec<FramePlan>>,
    signal: AvailabilitySignal,
}

impl Stretcher {
    /// Build a stretcher.
    ///
    /// Fails with a configuration error for zero channels, a non-positive
    /// sample rate, non-positive ratios, or contradictory options.
    pub fn new(
        sample_rate: f64,
        channels: usize,
        options: StretchOptions,
        time_ratio: f64,
        frequency_ratio: f64,
    ) -> Result<Self> {
        let config = options.validate(sample_rate, channels)?;
        let ratios = Ratios::new(time_ratio, frequency_ratio)?;
        let dispatcher = Dispatcher::new(config.threading, channels)?;

        let transform = SpectralTransform::new(config.window_length);
        let channel_states = (0..channels)
            .map(|i| Box::new(ChannelState::new(i, &config, transform.clone())))
            .collect();

        if config.debug_level >= 1 {
            tracing::debug!(
                "Stretcher: {} Hz, {} channels, window {}, realtime {}, precise {}, threaded {}, ratios {}/{}",
                config.sample_rate,
                config.channels,
                config.window_length,
                config.realtime,
                config.precise,
                dispatcher.is_threaded(),
                ratios.time,
                ratios.frequency
            );
        }

        Ok(Self {
            calculator: StretchCalculator::new(ratios.time, config.max_output_hop()),
            input_hop: config.input_hop(ratios.time),
            lock_bins: config.lock_bins(ratios.stretch_magnitude()),
            config,
            ratios,
            state: StretcherState::Created,
            transform,
            channels: channel_states,
            dispatcher,
            study: None,
            study_closed: false,
            profile: None,
            input_frames: 0,
            expected_input: None,
            output_target: None,
            complete: false,
            plans: Arc::new(Vec::new()),
            signal: AvailabilitySignal::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &StretchConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> StretcherState {
        self.state
    }

    #[inline]
    pub fn time_ratio(&self) -> f64 {
        self.ratios.time
    }

    #[inline]
    pub fn frequency_ratio(&self) -> f64 {
        self.ratios.frequency
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.config.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Processing delay in frames: input needed ahead of a frame's centre
    /// before that frame can be analysed.
    #[inline]
    pub fn latency(&self) -> usize {
        self.config.latency()
    }

    #[inline]
    pub fn is_threaded(&self) -> bool {
        self.dispatcher.is_threaded()
    }

    /// Handle for waiting on output from another thread.
    pub fn signal(&self) -> AvailabilitySignal {
        self.signal.clone()
    }

    /// Hint the total input length so output queues can be sized up front.
    ///
    /// Queues are sized for the output of a few windows, never the whole
    /// stream; callers that retrieve as they go keep memory bounded.
    /// Ignored in real-time mode.
    pub fn set_expected_input_duration(&mut self, frames: usize) {
        if self.config.realtime {
            return;
        }
        self.expected_input = Some(frames);
        let expected_output = (frames as f64 * self.ratios.time).ceil() as usize;
        let reserve = expected_output.min(self.output_working_size());
        for channel in &mut self.channels {
            channel.reserve_output(reserve);
        }
    }

    /// Change the time ratio for frames not yet scheduled.
    pub fn set_time_ratio(&mut self, ratio: f64) -> Result<()> {
        let ratio = check_ratio("time", ratio)?;
        self.ratios.time = ratio;
        self.calculator.set_ratio(ratio);
        self.lock_bins = self.config.lock_bins(self.ratios.stretch_magnitude());

        let hop = self.config.input_hop(ratio);
        if hop != self.input_hop {
            self.input_hop = hop;
            // study decisions are indexed on the old frame grid
            self.profile = None;
        }

        if self.output_target.is_some() && !self.complete {
            self.fix_output_target();
        }

        if self.config.debug_level >= 1 {
            tracing::debug!("Time ratio set to {ratio} (input hop {})", self.input_hop);
        }
        Ok(())
    }

    /// Change the frequency ratio for frames not yet scheduled.
    pub fn set_frequency_ratio(&mut self, ratio: f64) -> Result<()> {
        let ratio = check_ratio("frequency", ratio)?;
        self.ratios.frequency = ratio;
        self.lock_bins = self.config.lock_bins(self.ratios.stretch_magnitude());
        if self.config.debug_level >= 1 {
            tracing::debug!("Frequency ratio set to {ratio}");
        }
        Ok(())
    }

    /// Feed one block to the study pass (offline mode, before processing).
    pub fn study<S: AsRef<[f32]>>(&mut self, block: &[S], final_block: bool) -> Result<()> {
        if self.config.realtime {
            return Err(CoreError::State("study is not available in real-time mode".into()).into());
        }
        match self.state {
            StretcherState::Created | StretcherState::Studying => {}
            _ => {
                return Err(
                    CoreError::State("study called after processing has begun".into()).into(),
                )
            }
        }
        if self.study_closed {
            return Err(CoreError::State("study called after the final study block".into()).into());
        }
        self.check_block(block)?;

        let builder = self.study.get_or_insert_with(|| {
            ProfileBuilder::new(&self.config, self.transform.clone(), self.input_hop)
        });
        builder.feed(block, final_block);
        self.state = StretcherState::Studying;

        if final_block {
            self.study_closed = true;
            if self.config.debug_level >= 1 {
                tracing::debug!("Study pass complete: {} frames", builder.input_frames());
            }
        }
        Ok(())
    }

    /// Feed one block of input.
    ///
    /// `final_block = true` marks the end of the stream; no further input is
    /// accepted afterwards.
    pub fn process<S: AsRef<[f32]>>(&mut self, block: &[S], final_block: bool) -> Result<()> {
        if matches!(
            self.state,
            StretcherState::Draining | StretcherState::Finished
        ) {
            return Err(CoreError::State("input supplied after the final block".into()).into());
        }
        let frames = self.check_block(block)?;
        if self.state != StretcherState::Processing {
            self.begin_processing();
        }

        for (channel, samples) in self.channels.iter_mut().zip(block) {
            channel.push_input(samples.as_ref());
        }
        self.input_frames += frames as u64;

        if final_block {
            self.state = StretcherState::Draining;
            self.fix_output_target();
        }

        self.run_ready_frames();
        self.settle();

        if self.config.debug_level >= 2 {
            tracing::trace!(
                "process: {} frames in, {} windows, available {:?}",
                frames,
                self.plans.len(),
                self.available()
            );
        }
        self.publish();
        Ok(())
    }

    /// Frames per channel ready for [`retrieve`](Self::retrieve).
    ///
    /// `None` once the stream is finished and fully drained.
    pub fn available(&self) -> Option<usize> {
        if self.state == StretcherState::Finished {
            return None;
        }
        let ready = self
            .channels
            .iter()
            .map(|c| c.available())
            .min()
            .unwrap_or(0);
        if ready == 0 && self.complete {
            None
        } else {
            Some(ready)
        }
    }

    /// Move up to `count` frames per channel into `output`.
    ///
    /// Returns the number of frames written to every channel. Never blocks and
    /// never pads.
    pub fn retrieve<S: AsMut<[f32]>>(&mut self, output: &mut [S], count: usize) -> Result<usize> {
        if output.len() != self.config.channels {
            return Err(CoreError::ChannelMismatch {
                expected: self.config.channels,
                got: output.len(),
            }
            .into());
        }

        let frames = count.min(self.available().unwrap_or(0));
        for (channel, dest) in output.iter_mut().enumerate() {
            let got = dest.as_mut().len();
            if got < frames {
                return Err(CoreError::BlockLength {
                    channel,
                    expected: frames,
                    got,
                }
                .into());
            }
        }

        for (channel, dest) in self.channels.iter_mut().zip(output.iter_mut()) {
            channel.retrieve(&mut dest.as_mut()[..frames]);
        }

        self.settle();
        if self.config.debug_level >= 2 {
            tracing::trace!("retrieve: {frames} of {count} requested");
        }

        self.publish();
        Ok(frames)
    }

    /// Return to `Created`, discarding all buffered input, output and study
    /// state. Configuration, ratios and workers are kept.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.calculator.reset(self.ratios.time);
        self.study = None;
        self.study_closed = false;
        self.profile = None;
        self.input_frames = 0;
        self.output_target = None;
        self.complete = false;
        Arc::make_mut(&mut self.plans).clear();
        self.state = StretcherState::Created;
        if let Some(frames) = self.expected_input {
            self.set_expected_input_duration(frames);
        }
        self.publish();
    }

    /// Output one `process` call can leave queued for a typical block.
    fn output_working_size(&self) -> usize {
        let window = self.config.window_length;
        let per_window = (window as f64 * self.ratios.time.max(1.0)).ceil() as usize;
        OUTPUT_WINDOWS * per_window + window
    }

    fn check_block<S: AsRef<[f32]>>(&self, block: &[S]) -> Result<usize> {
        if block.len() != self.config.channels {
            return Err(CoreError::ChannelMismatch {
                expected: self.config.channels,
                got: block.len(),
            }
            .into());
        }
        let frames = block.first().map_or(0, |c| c.as_ref().len());
        for (channel, samples) in block.iter().enumerate() {
            let got = samples.as_ref().len();
            if got != frames {
                return Err(CoreError::BlockLength {
                    channel,
                    expected: frames,
                    got,
                }
                .into());
            }
        }
        Ok(frames)
    }

    fn begin_processing(&mut self) {
        if let Some(builder) = self.study.take() {
            let profile = builder.finish();
            if profile.hop() == self.input_hop {
                if !self.config.precise {
                    self.calculator.plan_elastic(&profile);
                }
                if self.config.debug_level >= 1 {
                    tracing::debug!(
                        "Using study profile: {} frames, {} transients, elastic {}",
                        profile.len(),
                        profile.transient_count(),
                        self.calculator.has_plan()
                    );
                }
                self.profile = Some(profile);
            } else if self.config.debug_level >= 1 {
                tracing::debug!("Discarding study profile built at a different hop");
            }
        }
        self.state = StretcherState::Processing;
    }

    fn fix_output_target(&mut self) {
        let target = self.calculator.expected_output(self.input_frames);
        self.output_target = Some(target);
        for channel in &mut self.channels {
            channel.set_output_limit(target);
        }
        if self.config.debug_level >= 1 {
            tracing::debug!(
                "Final block: {} input frames, {} output frames expected",
                self.input_frames,
                target
            );
        }
    }

    fn run_ready_frames(&mut self) {
        let window = self.config.window_length;
        let skip = self.config.latency() as u64;
        let mut queued = self.channels.first().map_or(0, |c| c.input_len());

        let pitch = if self.ratios.is_pitch_shifted() {
            self.ratios.frequency as f32
        } else {
            1.0
        };
        let plans = Arc::make_mut(&mut self.plans);
        plans.clear();
        loop {
            let more = match self.output_target {
                Some(target) => target > 0 && self.calculator.output_position() < target + skip,
                None => queued >= window,
            };
            if !more {
                break;
            }

            let index = self.calculator.frame();
            let output_hop = self.calculator.next_increment(self.input_hop);
            let transient = self
                .profile
                .as_ref()
                .and_then(|p| p.frame(index))
                .map(|f| f.transient);
            plans.push(FramePlan {
                index,
                input_hop: self.input_hop,
                output_hop,
                pitch,
                lock_bins: self.lock_bins,
                transient,
            });
            queued = queued.saturating_sub(self.input_hop);
        }

        self.dispatcher.run(&mut self.channels, &self.plans);

        if let Some(target) = self.output_target {
            if target == 0 || self.calculator.output_position() >= target + skip {
                self.complete = true;
            }
        }
    }

    /// Enter `Finished` once the last frame has been retrieved.
    fn settle(&mut self) {
        if self.complete && self.state == StretcherState::Draining && self.available().is_none() {
            self.state = StretcherState::Finished;
            if self.config.debug_level >= 1 {
                tracing::debug!("Stream finished");
            }
        }
    }

    fn publish(&self) {
        self.signal.publish(self.available());
    }
}

impl std::fmt::Debug for Stretcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stretcher")
            .field("state", &self.state)
            .field("ratios", &self.ratios)
            .field("channels", &self.config.channels)
            .field("input_frames", &self.input_frames)
            .field("available", &self.available())
            .finish()
    }
}
