//! File-to-file stretching.
//!
//! Reads the whole input WAV, runs the study pass (offline only) and the
//! processing pass in fixed-size blocks, and writes everything the stretcher
//! produces to an output WAV with the input's format.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use allargando_stretch::Stretcher;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::args::CliArgs;
use crate::error::{CliError, Result};

/// Frames handed to the stretcher per call.
pub const BLOCK_SIZE: usize = 1024;

/// How long to wait for more output while draining.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Planar audio loaded from a WAV file.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub spec: WavSpec,
    pub channels: Vec<Vec<f32>>,
}

impl AudioFile {
    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Load a WAV file as planar `f32` in [-1, 1].
pub fn read_wav(path: &Path) -> Result<AudioFile> {
    let input_error = |source: hound::Error| CliError::Input {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = WavReader::open(path).map_err(input_error)?;
    let spec = reader.spec();
    let channel_count = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(input_error)?,
        SampleFormat::Int => {
            let scale = 1.0 / 2f64.powi(i32::from(spec.bits_per_sample) - 1);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (f64::from(v) * scale) as f32))
                .collect::<std::result::Result<_, _>>()
                .map_err(input_error)?
        }
    };

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    tracing::debug!(
        "Loaded {}: {} channels, {} Hz, {} frames",
        path.display(),
        channel_count,
        spec.sample_rate,
        frames
    );
    Ok(AudioFile { spec, channels })
}

/// Counts reported after a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub input_frames: usize,
    pub output_frames: usize,
    pub time_ratio: f64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// `round(input × ratio)`.
    pub fn ideal_output(&self) -> usize {
        (self.input_frames as f64 * self.time_ratio).round() as usize
    }

    pub fn error(&self) -> usize {
        self.ideal_output().abs_diff(self.output_frames)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "in: {}, out: {}, ratio: {}, ideal output: {}, error: {}",
            self.input_frames,
            self.output_frames,
            self.time_ratio,
            self.ideal_output(),
            self.error()
        )?;
        let secs = self.elapsed.as_secs_f64();
        let rate = |frames: usize| if secs > 0.0 { frames as f64 / secs } else { 0.0 };
        write!(
            f,
            "elapsed time: {secs:.3} sec, in frames/sec: {:.0}, out frames/sec: {:.0}",
            rate(self.input_frames),
            rate(self.output_frames)
        )
    }
}

/// Stretch `args.input` into `args.output`.
pub fn run(args: &CliArgs) -> Result<RunSummary> {
    let started = Instant::now();
    let audio = read_wav(&args.input)?;
    let frames = audio.frames();
    let spec = audio.spec;

    let mut stretcher = Stretcher::new(
        f64::from(spec.sample_rate),
        audio.channels.len(),
        args.options,
        args.time_ratio,
        args.frequency_ratio,
    )?;
    stretcher.set_expected_input_duration(frames);

    let mut sink = OutputSink::create(&args.output, spec, audio.channels.len())?;
    let mut progress = Progress::new(args.quiet);

    if !args.options.is_realtime() {
        progress.message("Pass 1: Studying...");
        for start in (0..frames).step_by(BLOCK_SIZE) {
            let (block, last) = block_at(&audio.channels, start);
            stretcher.study(&block, last)?;
            progress.update(start, frames);
        }
        progress.message("\rCalculating profile...");
        progress.message("Pass 2: Processing...");
    }

    for start in (0..frames).step_by(BLOCK_SIZE) {
        let (block, last) = block_at(&audio.channels, start);
        stretcher.process(&block, last)?;
        sink.drain_ready(&mut stretcher)?;
        progress.update(start, frames);
    }
    if frames == 0 {
        let empty = vec![Vec::<f32>::new(); audio.channels.len()];
        stretcher.process(&empty, true)?;
    }
    progress.finish();

    let signal = stretcher.signal();
    while let Some(ready) = stretcher.available() {
        if ready > 0 {
            sink.drain_ready(&mut stretcher)?;
        } else {
            signal.wait_for(1, DRAIN_POLL);
        }
    }

    let output_frames = sink.finalize()?;
    Ok(RunSummary {
        input_frames: frames,
        output_frames,
        time_ratio: args.time_ratio,
        elapsed: started.elapsed(),
    })
}

/// Per-channel slices for the block starting at `start`, and whether it is
/// the last one.
fn block_at(channels: &[Vec<f32>], start: usize) -> (Vec<&[f32]>, bool) {
    let frames = channels.first().map_or(0, Vec::len);
    let end = (start + BLOCK_SIZE).min(frames);
    let block = channels.iter().map(|c| &c[start..end]).collect();
    (block, start + BLOCK_SIZE >= frames)
}

/// Interleaving WAV writer fed from the stretcher.
struct OutputSink {
    path: std::path::PathBuf,
    writer: WavWriter<BufWriter<File>>,
    format: SampleFormat,
    int_scale: f64,
    buffers: Vec<Vec<f32>>,
    written: usize,
}

impl OutputSink {
    fn create(path: &Path, spec: WavSpec, channels: usize) -> Result<Self> {
        let writer = WavWriter::create(path, spec).map_err(|source| CliError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            format: spec.sample_format,
            int_scale: 2f64.powi(i32::from(spec.bits_per_sample) - 1) - 1.0,
            buffers: vec![Vec::new(); channels],
            written: 0,
        })
    }

    /// Retrieve and write everything currently available.
    fn drain_ready(&mut self, stretcher: &mut Stretcher) -> Result<()> {
        let ready = stretcher.available().unwrap_or(0);
        if ready == 0 {
            return Ok(());
        }
        for buffer in &mut self.buffers {
            buffer.resize(ready, 0.0);
        }
        let got = stretcher.retrieve(&mut self.buffers, ready)?;
        self.write_frames(got)
    }

    fn write_frames(&mut self, count: usize) -> Result<()> {
        for i in 0..count {
            for buffer in &self.buffers {
                let sample = buffer[i].clamp(-1.0, 1.0);
                let written = match self.format {
                    SampleFormat::Float => self.writer.write_sample(sample),
                    SampleFormat::Int => self
                        .writer
                        .write_sample((f64::from(sample) * self.int_scale).round() as i32),
                };
                written.map_err(|source| self.output_error(source))?;
            }
        }
        self.written += count;
        Ok(())
    }

    fn finalize(self) -> Result<usize> {
        let written = self.written;
        let path = self.path;
        self.writer
            .finalize()
            .map_err(|source| CliError::Output { path, source })?;
        Ok(written)
    }

    fn output_error(&self, source: hound::Error) -> CliError {
        CliError::Output {
            path: self.path.clone(),
            source,
        }
    }
}

/// Percentage meter on stderr.
struct Progress {
    quiet: bool,
    last: Option<usize>,
}

impl Progress {
    fn new(quiet: bool) -> Self {
        Self { quiet, last: None }
    }

    fn message(&mut self, text: &str) {
        if !self.quiet {
            eprintln!("{text}");
        }
        self.last = None;
    }

    fn update(&mut self, position: usize, total: usize) {
        if self.quiet || total == 0 {
            return;
        }
        let percent = position * 100 / total;
        if self.last != Some(percent) {
            self.last = Some(percent);
            eprint!("\r{percent}% ");
            let _ = io::stderr().flush();
        }
    }

    fn finish(&mut self) {
        if !self.quiet {
            eprintln!("\r100%");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_cover_input_once() {
        let channels = vec![vec![0.0f32; 2500], vec![1.0f32; 2500]];
        let mut covered = 0;
        let mut finals = 0;
        for start in (0..2500).step_by(BLOCK_SIZE) {
            let (block, last) = block_at(&channels, start);
            assert_eq!(block.len(), 2);
            covered += block[0].len();
            finals += usize::from(last);
        }
        assert_eq!(covered, 2500);
        assert_eq!(finals, 1);
    }

    #[test]
    fn test_summary_reports_error() {
        let summary = RunSummary {
            input_frames: 10_000,
            output_frames: 19_998,
            time_ratio: 2.0,
            elapsed: Duration::from_millis(500),
        };
        assert_eq!(summary.ideal_output(), 20_000);
        assert_eq!(summary.error(), 2);
        let text = summary.to_string();
        assert!(text.starts_with("in: 10000, out: 19998, ratio: 2, ideal output: 20000, error: 2"));
        assert!(text.contains("in frames/sec: 20000"));
    }
}
