//! Server and client configuration.
//!
//! Both structs deserialize from JSON with every field optional, so a
//! config file only needs the values it overrides.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use relay_core::MAX_PREFIX_LEN;
use serde::{Deserialize, Serialize};

use crate::{error::TransportError, protocol::DEFAULT_MAX_FRAME_LEN};

/// Port the relay listens on by default.
pub const DEFAULT_PORT: u16 = 65432;

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Longest accepted frame, in bytes.
    pub max_frame_len: usize,
    /// Pause between replayed messages, in milliseconds. 0 disables it.
    pub replay_pace_ms: u64,
    /// How long to wait for the cursor announcement before assuming 0.
    /// `None` waits indefinitely.
    pub cursor_timeout_ms: Option<u64>,
    /// Hold operator input until this many clients are live.
    pub wait_for_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            replay_pace_ms: 0,
            cursor_timeout_ms: None,
            wait_for_clients: 0,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file can't be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        load_json(path)
    }

    #[must_use]
    pub const fn replay_pace(&self) -> Option<Duration> {
        match self.replay_pace_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    #[must_use]
    pub fn cursor_timeout(&self) -> Option<Duration> {
        self.cursor_timeout_ms.map(Duration::from_millis)
    }

    /// Longest publishable text whose data frame still fits in
    /// `max_frame_len`, whatever its id.
    #[must_use]
    pub const fn max_text_len(&self) -> usize {
        self.max_frame_len.saturating_sub(MAX_PREFIX_LEN)
    }
}

/// Relay client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay server to connect to.
    pub server_addr: String,
    /// Cursor file. `None` uses the per-user default location.
    pub cursor_path: Option<PathBuf>,
    /// Operator input that ends the session (case-insensitive).
    pub quit_command: String,
    /// Longest accepted frame, in bytes.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            cursor_path: None,
            quit_command: "quit".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file can't be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        load_json(path)
    }

    /// Whether an operator input line is the quit command.
    #[must_use]
    pub fn is_quit(&self, line: &str) -> bool {
        line.trim().eq_ignore_ascii_case(&self.quit_command)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TransportError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| TransportError::Config(format!("{}: {e}", path.display())))
}
