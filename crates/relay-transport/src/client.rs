//! Sync client: announces its cursor, then consumes replay and live
//! messages while keeping the cursor persisted.

use futures::{SinkExt, StreamExt};
use relay_core::{CursorStore, Message, MessageId};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};

use crate::{
    error::TransportError,
    protocol::{self, LineFramed, SyncRequest},
};

/// Client side of the relay protocol.
pub struct SyncClient<T, C> {
    lines: LineFramed<T>,
    cursor: C,
    last_seen: MessageId,
}

impl<C: CursorStore> SyncClient<TcpStream, C> {
    /// Connect to a relay server and announce the persisted cursor.
    ///
    /// # Errors
    /// Returns error if the connection or the sync announcement fails.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        cursor: C,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::info!(%peer, "Connected to relay");
        }
        Self::new(stream, cursor, max_frame_len).await
    }
}

impl<T, C> SyncClient<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin,
    C: CursorStore,
{
    /// Announce the persisted cursor over an established stream.
    ///
    /// # Errors
    /// Returns error if the sync announcement can't be written.
    pub async fn new(io: T, cursor: C, max_frame_len: usize) -> Result<Self, TransportError> {
        let start = cursor.load().await;
        let mut lines = protocol::framed(io, max_frame_len);
        lines.send(SyncRequest::new(start).encode()).await?;
        tracing::info!(cursor = start, "Requested updates after id {start}");

        Ok(Self {
            lines,
            cursor,
            last_seen: start,
        })
    }

    /// Highest id consumed so far (the loaded cursor before any message).
    #[must_use]
    pub const fn last_seen(&self) -> MessageId {
        self.last_seen
    }

    #[must_use]
    pub const fn cursor_store(&self) -> &C {
        &self.cursor
    }

    /// Receive until the server closes the connection.
    ///
    /// Each valid message is handed to `consume`, then its id is saved.
    /// Malformed frames are skipped; a failed save is logged and the
    /// message still counts as delivered.
    ///
    /// # Errors
    /// Returns error if reading fails or a frame exceeds the length limit.
    pub async fn run<F>(&mut self, mut consume: F) -> Result<(), TransportError>
    where
        F: FnMut(&Message),
    {
        while let Some(frame) = self.lines.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return Err(e.into()),
            };

            let Some(msg) = Message::parse(&frame) else {
                tracing::warn!(?frame, "Ignoring malformed message");
                continue;
            };

            consume(&msg);
            self.last_seen = msg.id;
            if let Err(e) = self.cursor.save(msg.id).await {
                tracing::error!(id = msg.id, "Failed to persist cursor: {e}");
            }
        }

        tracing::info!(last_seen = self.last_seen, "Server closed the connection");
        Ok(())
    }
}
