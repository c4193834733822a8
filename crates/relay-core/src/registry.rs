//! Registry of live, synchronized connections.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::message::Message;

/// Connection identifier, assigned on accept.
pub type ConnectionId = Uuid;

/// Handle used by the publisher to reach one connection.
///
/// Delivery only enqueues; the connection routine owns the stream and
/// does the actual write.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Remote address, when known.
    pub peer: Option<SocketAddr>,
    tx: mpsc::UnboundedSender<Arc<Message>>,
}

/// The connection routine behind a handle has gone away.
#[derive(Debug, thiserror::Error)]
#[error("Connection {0} closed")]
pub struct DeliveryError(pub ConnectionId);

impl ClientHandle {
    /// Create a handle and the receiver its connection routine drains.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
    ) -> (Self, mpsc::UnboundedReceiver<Arc<Message>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, peer, tx }, rx)
    }

    /// Queue a message for this connection.
    ///
    /// # Errors
    /// Returns error if the connection routine dropped its receiver.
    pub fn deliver(&self, msg: Arc<Message>) -> Result<(), DeliveryError> {
        self.tx.send(msg).map_err(|_| DeliveryError(self.id))
    }
}

/// Set of connections eligible for live fan-out.
pub struct ClientRegistry {
    clients: Mutex<HashMap<ConnectionId, ClientHandle>>,
    count: watch::Sender<usize>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            clients: Mutex::new(HashMap::new()),
            count,
        }
    }

    /// Register a connection. Returns the new member count.
    pub fn add(&self, handle: ClientHandle) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.insert(handle.id, handle);
        let len = clients.len();
        self.count.send_replace(len);
        len
    }

    /// Remove a connection. Returns the handle if it was registered.
    pub fn remove(&self, id: ConnectionId) -> Option<ClientHandle> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = clients.remove(&id);
        self.count.send_replace(clients.len());
        removed
    }

    /// Copy of the current membership.
    ///
    /// The lock is held only while copying.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        *self.count.borrow()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `n` connections are registered.
    pub async fn wait_for_clients(&self, n: usize) {
        let mut rx = self.count.subscribe();
        // the sender lives in `self`, so this only fails if `self` is gone
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn handle() -> (ClientHandle, mpsc::UnboundedReceiver<Arc<Message>>) {
        ClientHandle::new(Uuid::new_v4(), None)
    }

    #[test]
    fn test_add_remove_snapshot() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = handle();
        let (b, _rx_b) = handle();
        let a_id = a.id;

        assert_eq!(registry.add(a), 1);
        assert_eq!(registry.add(b), 2);
        assert_eq!(registry.snapshot().len(), 2);
        assert!(registry.snapshot().iter().any(|h| h.id == a_id));

        assert!(registry.remove(a_id).is_some());
        assert!(registry.remove(a_id).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot().iter().all(|h| h.id != a_id));
    }

    #[test]
    fn test_deliver_to_dropped_receiver_fails() {
        let (h, rx) = handle();
        drop(rx);
        assert!(h.deliver(Arc::new(Message::new(1, "x"))).is_err());
    }

    #[test]
    fn test_deliver_enqueues() {
        let (h, mut rx) = handle();
        h.deliver(Arc::new(Message::new(1, "x"))).unwrap();
        assert_eq!(rx.try_recv().unwrap().text, "x");
    }

    #[tokio::test]
    async fn test_wait_for_clients() {
        let registry = Arc::new(ClientRegistry::new());
        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_for_clients(2).await })
        };

        let (a, _rx_a) = handle();
        registry.add(a);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let (b, _rx_b) = handle();
        registry.add(b);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_zero_returns_immediately() {
        let registry = ClientRegistry::new();
        registry.wait_for_clients(0).await;
    }
}
