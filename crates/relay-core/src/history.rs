//! Append-only message history for catch-up replay.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::message::{Message, MessageId};

struct Inner {
    messages: Vec<Arc<Message>>,
    last_id: MessageId,
}

/// Append-only history of stamped messages.
///
/// Ids start at 1 and are gapless: index `i` holds id `i + 1`. There is
/// no compaction, the log lives as long as the process.
pub struct HistoryStore {
    inner: Mutex<Inner>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: Vec::with_capacity(32),
                last_id: 0,
            }),
        }
    }

    /// Lock the history for a compound operation.
    ///
    /// Everything done through the guard is atomic with respect to other
    /// appends and snapshots.
    pub fn lock(&self) -> HistoryGuard<'_> {
        HistoryGuard {
            inner: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Stamp `text` with the next id and append it.
    pub fn append(&self, text: impl Into<String>) -> Arc<Message> {
        self.lock().append(text)
    }

    /// Snapshot of all messages with `id > cursor`, in id order.
    #[must_use]
    pub fn since(&self, cursor: MessageId) -> Vec<Arc<Message>> {
        self.lock().since(cursor)
    }

    /// Id of the newest message, or 0 when empty.
    #[must_use]
    pub fn last_id(&self) -> MessageId {
        self.lock().inner.last_id
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().inner.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to the history.
pub struct HistoryGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl HistoryGuard<'_> {
    /// Stamp `text` with the next id and append it.
    pub fn append(&mut self, text: impl Into<String>) -> Arc<Message> {
        let id = self.inner.last_id + 1;
        let msg = Arc::new(Message::new(id, text));
        self.inner.messages.push(Arc::clone(&msg));
        self.inner.last_id = id;
        msg
    }

    /// All messages with `id > cursor`, in id order.
    #[must_use]
    pub fn since(&self, cursor: MessageId) -> Vec<Arc<Message>> {
        // ids are gapless, so id N sits at index N - 1
        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        self.inner
            .messages
            .get(start..)
            .map(<[Arc<Message>]>::to_vec)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_id(&self) -> MessageId {
        self.inner.last_id
    }
}
