//! Core traits for client-side state.

use async_trait::async_trait;
use thiserror::Error;

use crate::MessageId;

/// Cursor persistence error.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for cursor storage backends.
///
/// The cursor is the highest message id the client has consumed.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the persisted cursor.
    ///
    /// Never fails: missing or unreadable state yields 0.
    async fn load(&self) -> MessageId;

    /// Persist the cursor.
    async fn save(&self, id: MessageId) -> Result<(), CursorError>;
}
