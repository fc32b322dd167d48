//! Centralized error type for the allargando umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] allargando_core::Error),

    #[error(transparent)]
    Stretch(#[from] allargando_stretch::Error),

    #[cfg(feature = "cli")]
    #[error("CLI: {0}")]
    Cli(#[from] allargando_cli::CliError),
}

impl Error {
    /// True for invalid construction parameters or contradictory options.
    pub fn is_config(&self) -> bool {
        match self {
            Error::Core(e) => e.is_config(),
            Error::Stretch(e) => e.is_config(),
            #[cfg(feature = "cli")]
            Error::Cli(_) => false,
        }
    }

    /// True for calls made in the wrong order or with the wrong shape.
    pub fn is_state(&self) -> bool {
        match self {
            Error::Core(e) => e.is_state(),
            Error::Stretch(e) => e.is_state(),
            #[cfg(feature = "cli")]
            Error::Cli(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
