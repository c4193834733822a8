//! In-memory cursor storage.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use relay_core::{CursorError, CursorStore, MessageId};

/// In-memory cursor.
///
/// Useful for tests and embedded clients. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    value: AtomicU64,
}

impl MemoryCursor {
    /// Create a cursor starting at `id`.
    #[must_use]
    pub const fn new(id: MessageId) -> Self {
        Self {
            value: AtomicU64::new(id),
        }
    }

    /// Current value without going through the trait.
    #[must_use]
    pub fn get(&self) -> MessageId {
        self.value.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CursorStore for MemoryCursor {
    async fn load(&self) -> MessageId {
        self.get()
    }

    async fn save(&self, id: MessageId) -> Result<(), CursorError> {
        self.value.store(id, Ordering::Release);
        Ok(())
    }
}
