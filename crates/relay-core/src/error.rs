//! Hub error type.

use thiserror::Error;

/// Errors reported by the publish path.
///
/// None of these are fatal: the caller reports them and keeps going.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Message contains a line break")]
    MultilineMessage,
    #[error("Message is {len} bytes, limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}
