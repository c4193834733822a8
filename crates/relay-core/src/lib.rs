//! Core abstractions for history-backed broadcast relays.
//!
//! This crate provides the fundamental building blocks:
//! - `HistoryStore` - Append-only, id-stamped message log
//! - `ClientRegistry` - Live connections eligible for fan-out
//! - `Hub` - Publisher and catch-up subscription entry point
//! - `CursorStore` trait for client-side persisted cursors

pub mod error;
pub mod history;
pub mod hub;
pub mod message;
pub mod registry;
pub mod traits;

pub use error::RelayError;
pub use history::HistoryStore;
pub use hub::{Hub, Published, Subscription};
pub use message::{MAX_PREFIX_LEN, Message, MessageId};
pub use registry::{ClientHandle, ClientRegistry, ConnectionId};
pub use traits::{CursorError, CursorStore};
