use serde::{Deserialize, Serialize};

use crate::error::{Result, SagentError};

/// A short text message exchanged between two agents.
///
/// On the wire a message is a flat JSON object:
///
/// ```json
/// {"id": 1, "message": "hello sun"}
/// ```
///
/// `text` is accepted as an alias for `message` when decoding. `sender` is
/// only present on messages that were received from somewhere; locally built
/// outbound messages leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: u64,
    #[serde(rename = "message", alias = "text")]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
}

impl Message {
    /// Build an outbound message. Ids are agent-local and start at 1.
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender: None,
        }
    }

    /// Attach the sender identity. Used by transports on receipt.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Whether the text contains `keyword`, ignoring ASCII case.
    pub fn mentions(&self, keyword: &str) -> bool {
        self.text
            .to_ascii_lowercase()
            .contains(&keyword.to_ascii_lowercase())
    }

    /// Serialize to the single-object JSON wire form (no trailing newline).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one wire payload. Surrounding whitespace (including the frame
    /// delimiter) is ignored.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let trimmed = std::str::from_utf8(payload)
            .map_err(|e| SagentError::Decode(format!("payload is not utf-8: {e}")))?
            .trim();
        serde_json::from_str(trimmed).map_err(|e| SagentError::Decode(e.to_string()))
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {:?}", self.id, self.text)?;
        if let Some(ref sender) = self.sender {
            write!(f, " from {sender}")?;
        }
        Ok(())
    }
}
