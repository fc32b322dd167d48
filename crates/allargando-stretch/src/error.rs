//! Error types for allargando-stretch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] allargando_core::Error),

    #[error("Failed to spawn channel worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

impl Error {
    /// True for invalid construction parameters or contradictory options.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Core(e) if e.is_config())
    }

    /// True for caller misuse of the streaming API.
    pub fn is_state(&self) -> bool {
        matches!(self, Error::Core(e) if e.is_state())
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_kind() {
        let err: Error = allargando_core::Error::State("late".into()).into();
        assert!(err.is_state());
        assert!(!err.is_config());
        assert_eq!(err.to_string(), "Invalid state: late");

        let err: Error = allargando_core::Error::Config("bad".into()).into();
        assert!(err.is_config());
    }

    #[test]
    fn test_spawn_error_is_neither() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "no threads").into();
        assert!(!err.is_config());
        assert!(!err.is_state());
        assert!(err.to_string().contains("no threads"));
    }
}
