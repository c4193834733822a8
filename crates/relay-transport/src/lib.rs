//! Transport layer for the broadcast relay.
//!
//! Provides:
//! - Wire protocol (newline-framed `SYNC:<id>` / `<id>:<text>`)
//! - TCP server with the per-connection sync handshake
//! - Sync client with persisted cursor
//! - Server and client configuration

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::SyncClient;
pub use config::{ClientConfig, ServerConfig};
pub use error::TransportError;
pub use protocol::SyncRequest;
pub use server::{ConnState, RelayServer};
