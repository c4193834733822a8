//! Broadcast hub: stamps, stores and fans out messages, and hands new
//! connections their catch-up backlog.

use std::{net::SocketAddr, sync::Arc};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    RelayError,
    history::HistoryStore,
    message::{Message, MessageId},
    registry::{ClientHandle, ClientRegistry, ConnectionId},
};

/// Outcome of a publish.
#[derive(Debug, Clone)]
pub struct Published {
    /// The stored message.
    pub message: Arc<Message>,
    /// Connections the message was queued for.
    pub recipients: usize,
    /// Connections whose routine was already gone.
    pub failed: usize,
}

/// A registered connection's view of the stream.
///
/// `backlog` holds every stored message newer than the announced cursor
/// at registration time, `live` yields everything published afterwards.
/// No message appears in both.
pub struct Subscription {
    pub id: ConnectionId,
    pub backlog: Vec<Arc<Message>>,
    pub live: mpsc::UnboundedReceiver<Arc<Message>>,
}

/// Shared state of a relay: the history and the live registry.
///
/// These are the only two pieces of cross-connection state.
#[derive(Default)]
pub struct Hub {
    history: HistoryStore,
    registry: ClientRegistry,
    max_text_len: Option<usize>,
}

impl Hub {
    /// Hub without a text length limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub that rejects text longer than `max` bytes.
    ///
    /// Anything stored is replayed to every reconnecting client, so text
    /// that wouldn't fit in a client's frame must never be accepted.
    #[must_use]
    pub fn with_max_text_len(max: usize) -> Self {
        Self {
            max_text_len: Some(max),
            ..Self::default()
        }
    }

    /// Publish `text` to history and every registered connection.
    ///
    /// Append and registry snapshot happen under the history lock, so a
    /// concurrent [`Hub::subscribe`] sees the message either in its
    /// backlog or on its live channel, never both.
    ///
    /// # Errors
    /// Returns error if `text` is blank, spans several lines or exceeds
    /// the length limit. Nothing is stored in that case.
    pub fn publish(&self, text: &str) -> Result<Published, RelayError> {
        if text.trim().is_empty() {
            tracing::warn!("Ignoring empty message");
            return Err(RelayError::EmptyMessage);
        }
        if text.contains(['\n', '\r']) {
            tracing::warn!("Ignoring message with line breaks");
            return Err(RelayError::MultilineMessage);
        }
        if let Some(max) = self.max_text_len.filter(|max| text.len() > *max) {
            tracing::warn!(len = text.len(), max, "Ignoring oversized message");
            return Err(RelayError::MessageTooLong {
                len: text.len(),
                max,
            });
        }

        let mut history = self.history.lock();
        let message = history.append(text);
        let targets = self.registry.snapshot();

        if targets.is_empty() {
            tracing::warn!(
                id = message.id,
                "Message stored, no clients connected for live delivery"
            );
        } else {
            tracing::info!(id = message.id, clients = targets.len(), "Broadcasting");
        }

        // Enqueueing never blocks; socket writes happen in each
        // connection's own task.
        let mut failed = 0;
        for handle in &targets {
            if let Err(e) = handle.deliver(Arc::clone(&message)) {
                tracing::debug!(peer = ?handle.peer, "Skipping delivery: {e}");
                failed += 1;
            }
        }
        drop(history);

        Ok(Published {
            message,
            recipients: targets.len() - failed,
            failed,
        })
    }

    /// Register a connection that has announced `cursor`.
    ///
    /// Backlog snapshot and registration form a single critical section.
    pub fn subscribe(&self, cursor: MessageId, peer: Option<SocketAddr>) -> Subscription {
        let (handle, live) = ClientHandle::new(Uuid::new_v4(), peer);
        let id = handle.id;

        let history = self.history.lock();
        let backlog = history.since(cursor);
        let clients = self.registry.add(handle);
        drop(history);

        tracing::debug!(%id, cursor, backlog = backlog.len(), clients, "Registered connection");
        Subscription { id, backlog, live }
    }

    /// Drop a connection from live fan-out.
    pub fn unsubscribe(&self, id: ConnectionId) {
        if self.registry.remove(id).is_some() {
            tracing::debug!(%id, clients = self.registry.len(), "Unregistered connection");
        }
    }

    #[must_use]
    pub const fn history(&self) -> &HistoryStore {
        &self.history
    }

    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Wait until at least `n` connections are live.
    pub async fn wait_for_clients(&self, n: usize) {
        self.registry.wait_for_clients(n).await;
    }
}
