//! TCP relay server and the per-connection sync handshake.

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use relay_core::{ConnectionId, Hub, MessageId, Subscription};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::codec::LinesCodecError;

use crate::{
    config::ServerConfig,
    error::TransportError,
    protocol::{self, LineFramed, SyncRequest},
};

/// Back-off after a failed accept, so a persistent error (e.g. fd
/// exhaustion) doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the client's `SYNC:<cursor>` frame.
    AwaitingCursor,
    /// Streaming stored messages newer than the cursor.
    Replaying,
    /// Registered for live fan-out.
    Live,
    /// Stream released and unregistered.
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingCursor => "awaiting_cursor",
            Self::Replaying => "replaying",
            Self::Live => "live",
            Self::Closed => "closed",
        })
    }
}

/// What happened on a connection, returned once it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnReport {
    /// Cursor the handshake settled on.
    pub cursor: MessageId,
    /// Backlog messages written during replay.
    pub replayed: usize,
    /// Live messages written after replay.
    pub delivered: usize,
    /// Last state before `Closed`.
    pub reached: ConnState,
}

/// Relay server: accept loop plus one task per connection.
pub struct RelayServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
}

impl RelayServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// Returns error if the address can't be bound.
    pub async fn bind(config: ServerConfig, hub: Arc<Hub>) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            listener,
            hub,
            config: Arc::new(config),
        })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    /// Returns error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub const fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Accept connections forever.
    pub async fn serve(self) {
        let Self {
            listener,
            hub,
            config,
        } = self;

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%peer, "Failed to set TCP_NODELAY: {e}");
            }
            tokio::spawn(handle_connection(
                stream,
                peer,
                Arc::clone(&hub),
                Arc::clone(&config),
            ));
        }
    }

    /// Run the accept loop on a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.serve())
    }
}

/// Drive one connection through the sync handshake and live mode.
///
/// Never fails: every problem ends in `Closed` for this connection only.
pub async fn handle_connection<T>(
    io: T,
    peer: SocketAddr,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
) -> ConnReport
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    tracing::info!(%peer, "New connection, awaiting sync");
    let mut lines = protocol::framed(io, config.max_frame_len);

    let mut report = ConnReport {
        cursor: 0,
        replayed: 0,
        delivered: 0,
        reached: ConnState::AwaitingCursor,
    };
    let (cursor, peer_closed) = match read_cursor(&mut lines, peer, config.cursor_timeout()).await
    {
        Announce::Cursor(cursor) => (cursor, false),
        Announce::PeerClosed => (0, true),
        Announce::Oversized => {
            tracing::info!(%peer, from = %report.reached, to = %ConnState::Closed, "Client disconnected");
            return report;
        }
    };
    report.cursor = cursor;

    let Subscription { id, backlog, live } = hub.subscribe(cursor, Some(peer));
    let (mut sink, mut stream) = lines.split::<String>();

    report.reached = ConnState::Replaying;
    if !backlog.is_empty() {
        tracing::info!(%peer, %id, cursor, count = backlog.len(), "Replaying missed messages");
    }
    let pace = config.replay_pace();
    for msg in backlog {
        if let Err(e) = sink.send(msg.encode()).await {
            tracing::warn!(%peer, %id, "Replay failed: {e}");
            return close(&hub, id, peer, report);
        }
        report.replayed += 1;
        if let Some(pace) = pace {
            tokio::time::sleep(pace).await;
        }
    }

    if peer_closed {
        return close(&hub, id, peer, report);
    }

    report.reached = ConnState::Live;
    tracing::info!(%peer, %id, "Client synchronized, receiving live updates");

    let mut live = UnboundedReceiverStream::new(live);
    loop {
        tokio::select! {
            msg = live.next() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(msg.encode()).await {
                    tracing::warn!(%peer, %id, "Live delivery failed: {e}");
                    break;
                }
                report.delivered += 1;
            }
            frame = stream.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    tracing::debug!(%peer, %id, "Read failed: {e}");
                    break;
                }
                // nothing is expected from a live client; only closure matters
                Some(Ok(_)) => {}
            },
        }
    }

    close(&hub, id, peer, report)
}

/// Outcome of the `AwaitingCursor` step.
enum Announce {
    /// Cursor to replay from; 0 when the request was missing or malformed.
    Cursor(MessageId),
    /// Peer went away before announcing anything.
    PeerClosed,
    /// Frame exceeded the limit; the codec can't resync, so the
    /// connection is dropped.
    Oversized,
}

async fn read_cursor<T>(
    lines: &mut LineFramed<T>,
    peer: SocketAddr,
    timeout: Option<Duration>,
) -> Announce
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let next = match timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::warn!(%peer, "No sync request within {limit:?}, replaying from start");
                return Announce::Cursor(0);
            }
        },
        None => lines.next().await,
    };

    match next {
        Some(Ok(frame)) => {
            if let Some(req) = SyncRequest::parse(&frame) {
                tracing::info!(%peer, cursor = req.cursor, "Sync requested");
                Announce::Cursor(req.cursor)
            } else {
                tracing::warn!(%peer, ?frame, "Malformed sync request, replaying from start");
                Announce::Cursor(0)
            }
        }
        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
            tracing::warn!(%peer, "Oversized sync request, dropping connection");
            Announce::Oversized
        }
        Some(Err(LinesCodecError::Io(e))) => {
            tracing::debug!(%peer, "Read failed before sync: {e}");
            Announce::PeerClosed
        }
        None => {
            tracing::debug!(%peer, "Peer closed before sync");
            Announce::PeerClosed
        }
    }
}

fn close(hub: &Hub, id: ConnectionId, peer: SocketAddr, report: ConnReport) -> ConnReport {
    hub.unsubscribe(id);
    tracing::info!(
        %peer,
        %id,
        from = %report.reached,
        to = %ConnState::Closed,
        replayed = report.replayed,
        delivered = report.delivered,
        "Client disconnected"
    );
    report
}
