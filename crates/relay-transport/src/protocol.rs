//! Wire protocol for client-server communication.
//!
//! Every frame is one UTF-8 line:
//! - client -> server, once after connect: `SYNC:<cursor>`
//! - server -> client, replay and live: `<id>:<text>`

use std::fmt;

use relay_core::MessageId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};

/// Default upper bound on a single frame, in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

const SYNC_PREFIX: &str = "SYNC:";

/// Newline-framed line transport over any byte stream.
pub type LineFramed<T> = Framed<T, LinesCodec>;

/// Wrap `io` in the line codec.
pub fn framed<T>(io: T, max_frame_len: usize) -> LineFramed<T>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, LinesCodec::new_with_max_length(max_frame_len))
}

/// Cursor announcement sent by a client right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
    /// Last id the client has already processed, 0 if none.
    pub cursor: MessageId,
}

impl SyncRequest {
    #[must_use]
    pub const fn new(cursor: MessageId) -> Self {
        Self { cursor }
    }

    /// Parse a `SYNC:<u64>` frame. Surrounding whitespace is tolerated.
    #[must_use]
    pub fn parse(frame: &str) -> Option<Self> {
        let cursor = frame.trim().strip_prefix(SYNC_PREFIX)?.trim().parse().ok()?;
        Some(Self { cursor })
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SYNC_PREFIX}{}", self.cursor)
    }
}
