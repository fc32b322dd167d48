//! Test helpers and fixtures for allargando integration tests.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (silence, padding)
//! - `DSP_EPSILON` (1e-4): Unity-ratio resynthesis
//! - `PERCEPTUAL_EPSILON` (0.001): Perceptual equivalence (-60dB)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use std::time::Duration;

use allargando::prelude::*;

/// Default test sample rate
pub const TEST_SAMPLE_RATE: f64 = 44100.0;

/// Block size used when streaming through a stretcher
pub const TEST_BLOCK_SIZE: usize = 1024;

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
        })
        .collect()
}

/// Generate silence (zero samples).
pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Generate white noise (random samples in -1..1).
pub fn generate_noise(num_samples: usize, seed: u64) -> Vec<f32> {
    // Simple LCG for reproducible "random" noise
    let mut rng = seed;
    (0..num_samples)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((rng >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Regular clicks over a quiet tone.
pub fn generate_clicks(num_samples: usize, spacing: usize) -> Vec<f32> {
    let mut samples = generate_sine(220.0, TEST_SAMPLE_RATE, num_samples);
    for s in samples.iter_mut() {
        *s *= 0.05;
    }
    for pos in (spacing / 2..num_samples).step_by(spacing) {
        samples[pos] = 1.0;
    }
    samples
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Estimate the frequency of a tone from its rising zero crossings.
pub fn zero_crossing_frequency(samples: &[f32], sample_rate: f64) -> f32 {
    let crossings: Vec<usize> = samples
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
        .map(|(i, _)| i)
        .collect();
    if crossings.len() < 2 {
        return 0.0;
    }
    let span = (crossings[crossings.len() - 1] - crossings[0]) as f64;
    ((crossings.len() - 1) as f64 * sample_rate / span) as f32
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Retrieve everything currently available, appending to `output`.
///
/// Returns the number of frames moved.
pub fn retrieve_ready(stretcher: &mut Stretcher, output: &mut [Vec<f32>]) -> usize {
    let ready = stretcher.available().unwrap_or(0);
    if ready == 0 {
        return 0;
    }
    let mut block = vec![vec![0.0f32; ready]; output.len()];
    let got = stretcher
        .retrieve(&mut block, ready)
        .expect("Failed to retrieve");
    for (out, b) in output.iter_mut().zip(&block) {
        out.extend_from_slice(&b[..got]);
    }
    got
}

/// Drain a stretcher that has seen its final block until it reports the end
/// of the stream.
pub fn drain(stretcher: &mut Stretcher, output: &mut [Vec<f32>]) {
    let signal = stretcher.signal();
    let mut idle = 0;
    while stretcher.available().is_some() {
        if retrieve_ready(stretcher, output) == 0 {
            idle += 1;
            assert!(idle < 100, "stretcher stalled before finishing");
            signal.wait_for(1, Duration::from_millis(10));
        }
    }
}

/// Run a whole planar input through a new stretcher in fixed blocks.
///
/// Offline streams are studied first. Output is retrieved after every
/// `process` call and drained at the end.
pub fn stretch(
    input: &[Vec<f32>],
    options: StretchOptions,
    time_ratio: f64,
    frequency_ratio: f64,
) -> Vec<Vec<f32>> {
    let mut stretcher = Stretcher::new(
        TEST_SAMPLE_RATE,
        input.len(),
        options,
        time_ratio,
        frequency_ratio,
    )
    .expect("Failed to create stretcher");
    let frames = input[0].len();
    stretcher.set_expected_input_duration(frames);

    if !options.is_realtime() {
        for (block, last) in blocks(input, TEST_BLOCK_SIZE) {
            stretcher.study(&block, last).expect("study failed");
        }
    }

    let mut output = vec![Vec::new(); input.len()];
    let mut any = false;
    for (block, last) in blocks(input, TEST_BLOCK_SIZE) {
        stretcher.process(&block, last).expect("process failed");
        retrieve_ready(&mut stretcher, &mut output);
        any = true;
    }
    if !any {
        let empty = vec![Vec::<f32>::new(); input.len()];
        stretcher.process(&empty, true).expect("process failed");
    }
    drain(&mut stretcher, &mut output);
    assert_eq!(stretcher.state(), StretcherState::Finished);
    output
}

/// Split planar input into blocks, flagging the last one.
pub fn blocks(input: &[Vec<f32>], size: usize) -> Vec<(Vec<&[f32]>, bool)> {
    let frames = input[0].len();
    (0..frames)
        .step_by(size)
        .map(|start| {
            let end = (start + size).min(frames);
            let block = input.iter().map(|c| &c[start..end]).collect();
            (block, end == frames)
        })
        .collect()
}
