//! Error types for the command-line driver.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// Bad or missing arguments.
    #[error("{0}")]
    Usage(String),

    #[error("Failed to open input file \"{}\": {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write output file \"{}\": {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error(transparent)]
    Engine(#[from] allargando_stretch::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    /// Process exit code: 2 for usage errors (including option combinations
    /// the engine rejects), 1 for file and processing failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Engine(e) if e.is_config() => 2,
            CliError::Input { .. } | CliError::Output { .. } | CliError::Engine(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
