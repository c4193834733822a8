//! Transport error type.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame exceeds maximum length")]
    FrameTooLong,
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<LinesCodecError> for TransportError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => Self::FrameTooLong,
            LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}
