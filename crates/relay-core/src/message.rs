//! Stamped broadcast messages and their textual form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned message identifier. The first message is `1`.
pub type MessageId = u64;

/// Delimiter between id and text in the data frame.
pub const DELIMITER: char = ':';

/// Longest `<id>:` prefix a data frame can carry (`u64::MAX` plus the
/// delimiter).
pub const MAX_PREFIX_LEN: usize = 21;

/// A published message.
///
/// Immutable once stamped; shared between history and live delivery
/// as `Arc<Message>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Strictly increasing identifier.
    pub id: MessageId,
    /// Raw published text. May itself contain `:`.
    pub text: String,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// Encode as a `<id>:<text>` data frame.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a `<id>:<text>` data frame.
    ///
    /// Only the first delimiter is significant. Returns `None` when the
    /// delimiter is missing or the id is not a decimal `u64`.
    #[must_use]
    pub fn parse(frame: &str) -> Option<Self> {
        let (id, text) = frame.split_once(DELIMITER)?;
        let id = id.trim().parse::<MessageId>().ok()?;
        Some(Self::new(id, text))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.id, self.text)
    }
}
