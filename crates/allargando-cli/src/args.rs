//! Command-line argument parsing.
//!
//! Long options take `--name value` or `--name=value`; short options take
//! `-t 2` or `-t2`, and value-less short flags may be clustered (`-qP`).

use std::path::PathBuf;

use allargando_core::{
    semitones_to_ratio, Crispness, PhaseMode, ProcessMode, StretchOptions, ThreadingMode,
    TransientMode, WindowSize,
};

use crate::error::{CliError, Result};

pub const USAGE: &str = "\
Usage: allargando [options] <infile.wav> <outfile.wav>

You must specify at least one of the following time and pitch ratio options.

  -t<X>, --time <X>       Stretch to X times original duration, or
  -T<X>, --tempo <X>      Change tempo by multiple X (same as --time 1/X), or
  -p<X>, --pitch <X>      Raise pitch by X semitones, or
  -f<X>, --frequency <X>  Change frequency by multiple X

The following options provide a simple way to adjust the sound. See below
for more details.

  -c<N>, --crisp <N>      Crispness (N = 0,1,2,3,4,5); default 4 (see below)

The remaining options fine-tune the processing mode and stretch algorithm.
These are mostly included for test purposes; the default settings and standard
crispness parameter are intended to provide the best sounding set of options
for most situations.

  -P,    --precise        Aim for minimal time distortion (implied by -R)
  -R,    --realtime       Select realtime mode (implies -P --no-threads)
         --no-threads     No extra threads regardless of CPU and channel count
         --threads        Assume multi-CPU even if only one CPU is identified
         --no-transients  Disable phase resynchronisation at transients
         --bl-transients  Band-limit phase resync to extreme frequencies
         --no-peaklock    Disable phase locking to peak frequencies
         --no-softening   Disable large-ratio softening of phase locking
         --window-long    Use longer processing window (actual size may vary)
         --window-short   Use shorter processing window
         --thresh<N> <F>  Set internal freq threshold N (N = 0,1,2) to F Hz

  -d<N>, --debug <N>      Select debug level (N = 0,1,2,3); default 0, full 3
                          (N.B. debug level 3 includes audible ticks in output)
  -q,    --quiet          Suppress progress output

  -h,    --help           Show this help

\"Crispness\" levels:
  -c 0   equivalent to --no-transients --no-peaklock --window-long
  -c 1   equivalent to --no-transients --no-peaklock
  -c 2   equivalent to --no-transients
  -c 3   equivalent to --bl-transients
  -c 4   default processing options
  -c 5   equivalent to --no-peaklock --window-short (may be suitable for drums)
";

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Run(CliArgs),
}

/// A fully resolved invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub time_ratio: f64,
    pub frequency_ratio: f64,
    /// Options with the crispness preset (if one was given) applied last.
    pub options: StretchOptions,
    /// The preset in effect, for reporting.
    pub crispness: Crispness,
    pub quiet: bool,
    pub debug: u8,
}

/// Options that consume a value.
const VALUE_OPTIONS: &[&str] = &[
    "time",
    "tempo",
    "pitch",
    "frequency",
    "crisp",
    "crispness",
    "debug",
    "thresh0",
    "thresh1",
    "thresh2",
];

fn short_name(flag: char) -> Option<&'static str> {
    Some(match flag {
        'h' => "help",
        't' => "time",
        'T' => "tempo",
        'p' => "pitch",
        'f' => "frequency",
        'c' => "crispness",
        'd' => "debug",
        'R' => "realtime",
        'P' => "precise",
        'q' => "quiet",
        _ => return None,
    })
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I, S>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut state = ArgState::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--" {
            positional.extend(args.by_ref());
            break;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (long, None),
            };
            let value = if VALUE_OPTIONS.contains(&name) {
                match inline {
                    Some(value) => Some(value),
                    None => Some(
                        args.next()
                            .ok_or_else(|| CliError::usage(format!("option --{name} needs a value")))?,
                    ),
                }
            } else if inline.is_some() {
                return Err(CliError::usage(format!("option --{name} takes no value")));
            } else {
                None
            };
            state.apply(name, value)?;
        } else if arg.len() > 1 && arg.starts_with('-') {
            let body = &arg[1..];
            for (pos, flag) in body.char_indices() {
                let name = short_name(flag)
                    .ok_or_else(|| CliError::usage(format!("unknown option -{flag}")))?;
                if VALUE_OPTIONS.contains(&name) {
                    let rest = &body[pos + flag.len_utf8()..];
                    let value = if rest.is_empty() {
                        args.next()
                            .ok_or_else(|| CliError::usage(format!("option -{flag} needs a value")))?
                    } else {
                        rest.to_string()
                    };
                    state.apply(name, Some(value))?;
                    break;
                }
                state.apply(name, None)?;
            }
        } else {
            positional.push(arg);
        }
    }

    if state.help {
        return Ok(Command::Help);
    }
    state.finish(positional).map(Command::Run)
}

struct ArgState {
    time_ratio: f64,
    frequency: f64,
    semitones: f64,
    have_ratio: bool,
    help: bool,
    quiet: bool,
    debug: u8,
    crispness: Option<Crispness>,
    options: StretchOptions,
}

impl Default for ArgState {
    fn default() -> Self {
        Self {
            time_ratio: 1.0,
            frequency: 1.0,
            semitones: 0.0,
            have_ratio: false,
            help: false,
            quiet: false,
            debug: 0,
            crispness: None,
            options: StretchOptions::default(),
        }
    }
}

impl ArgState {
    fn apply(&mut self, name: &str, value: Option<String>) -> Result<()> {
        let value = value.unwrap_or_default();
        let options = self.options;
        match name {
            "help" => self.help = true,
            "time" => {
                self.time_ratio *= number(name, &value)?;
                self.have_ratio = true;
            }
            "tempo" => {
                let multiple = number(name, &value)?;
                if multiple != 0.0 {
                    self.time_ratio /= multiple;
                }
                self.have_ratio = true;
            }
            "pitch" => {
                self.semitones = number(name, &value)?;
                self.have_ratio = true;
            }
            "frequency" => {
                self.frequency = number(name, &value)?;
                self.have_ratio = true;
            }
            "crisp" | "crispness" => {
                let level = value
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| CliError::usage(format!("invalid crispness \"{value}\"")))?;
                let crispness =
                    Crispness::new(level).map_err(|e| CliError::usage(e.to_string()))?;
                self.crispness = Some(crispness);
            }
            "debug" => {
                let level = value.trim().parse::<u8>().ok().filter(|&l| l <= StretchOptions::MAX_DEBUG_LEVEL);
                self.debug = level.ok_or_else(|| {
                    CliError::usage(format!(
                        "debug level must be between 0 and {}, got \"{value}\"",
                        StretchOptions::MAX_DEBUG_LEVEL
                    ))
                })?;
            }
            "thresh0" | "thresh1" | "thresh2" => {
                let index = usize::from(name.as_bytes()[6] - b'0');
                self.options = options.threshold(index, number(name, &value)? as f32);
            }
            "realtime" => self.options = options.process_mode(ProcessMode::RealTime),
            "precise" => self.options = options.precise(true),
            "no-threads" => self.options = options.threading(ThreadingMode::Never),
            "threads" => self.options = options.threading(ThreadingMode::Always),
            "no-transients" => self.options = options.transients(TransientMode::None),
            "bl-transients" => self.options = options.transients(TransientMode::BandLimited),
            "no-peaklock" => self.options = options.phase(PhaseMode::Independent),
            "no-softening" => self.options = options.softening(false),
            "window-long" => self.options = options.window(WindowSize::Long),
            "window-short" => self.options = options.window(WindowSize::Short),
            "quiet" => self.quiet = true,
            _ => return Err(CliError::usage(format!("unknown option --{name}"))),
        }
        Ok(())
    }

    fn finish(self, positional: Vec<String>) -> Result<CliArgs> {
        if !self.have_ratio {
            return Err(CliError::usage("no time or pitch ratio given"));
        }
        let [input, output]: [String; 2] = positional.try_into().map_err(|got: Vec<String>| {
            CliError::usage(format!(
                "expected an input and an output file, got {} file argument(s)",
                got.len()
            ))
        })?;

        let frequency_ratio = self.frequency * semitones_to_ratio(self.semitones);
        if !(self.time_ratio.is_finite() && self.time_ratio > 0.0) {
            return Err(CliError::usage(format!(
                "time ratio must be positive, got {}",
                self.time_ratio
            )));
        }
        if !(frequency_ratio.is_finite() && frequency_ratio > 0.0) {
            return Err(CliError::usage(format!(
                "frequency ratio must be positive, got {frequency_ratio}"
            )));
        }

        let mut options = self.options.debug_level(self.debug);
        if let Some(crispness) = self.crispness {
            options = options.crispness(crispness);
        }

        Ok(CliArgs {
            input: input.into(),
            output: output.into(),
            time_ratio: self.time_ratio,
            frequency_ratio,
            options,
            crispness: self.crispness.unwrap_or_default(),
            quiet: self.quiet,
            debug: self.debug,
        })
    }
}

fn number(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| CliError::usage(format!("invalid number \"{value}\" for --{name}")))
}
