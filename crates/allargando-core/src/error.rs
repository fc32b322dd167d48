//! Error types for allargando-core.

use thiserror::Error;

/// Error type for stretcher construction and call ordering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid construction parameters or contradictory options.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Illegal call ordering, e.g. `study` after processing has begun.
    #[error("Invalid state: {0}")]
    State(String),

    /// Block channel count differs from the stretcher's channel count.
    #[error("Channel mismatch: expected {expected} channels, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    /// Channels within one block carry different frame counts.
    #[error("Block length mismatch: channel {channel} has {got} frames, expected {expected}")]
    BlockLength {
        channel: usize,
        expected: usize,
        got: usize,
    },
}

impl Error {
    /// True for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// True for caller misuse of the streaming API.
    pub fn is_state(&self) -> bool {
        matches!(
            self,
            Error::State(_) | Error::ChannelMismatch { .. } | Error::BlockLength { .. }
        )
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Config("x".into()).is_config());
        assert!(!Error::Config("x".into()).is_state());
        assert!(Error::State("x".into()).is_state());
        assert!(Error::ChannelMismatch {
            expected: 2,
            got: 1
        }
        .is_state());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::ChannelMismatch {
            expected: 2,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "Channel mismatch: expected 2 channels, got 3"
        );
    }
}
