//! Command-line front end for the allargando stretcher.
//!
//! ```text
//! allargando [options] <infile.wav> <outfile.wav>
//! ```
//!
//! Exit codes: 0 on success, 1 on file or processing failure, 2 on bad
//! arguments or a help request.

pub mod args;
pub mod driver;
pub mod error;

pub use args::{parse_args, CliArgs, Command, USAGE};
pub use driver::{read_wav, run, AudioFile, RunSummary, BLOCK_SIZE};
pub use error::{CliError, Result};
