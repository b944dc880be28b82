//! Generic message envelope used below the JSON-RPC framing layer.
//!
//! Transports exchange raw bytes; `fleetmcp-protocol` exchanges typed
//! JSON-RPC values. `Message` is the thin envelope transports use internally
//! to carry a payload plus identity and tracing metadata between the two.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::types::{ContentType, ProtocolVersion, Timestamp};

/// Unique identifier for a message, mirroring the shapes JSON-RPC ids take.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// String identifier.
    String(String),
    /// Numeric identifier.
    Number(i64),
    /// UUID identifier, used for envelopes with no caller-supplied id.
    Uuid(Uuid),
}

/// Tracking metadata carried alongside a message payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Message creation timestamp.
    pub created_at: Timestamp,
    /// Protocol version in effect when the message was created.
    pub protocol_version: ProtocolVersion,
    /// Content type of the payload.
    pub content_type: ContentType,
    /// Payload size in bytes.
    pub size: usize,
    /// Correlation id for cross-component tracing.
    pub correlation_id: Option<String>,
    /// Custom transport headers (HTTP) or metadata (stdio has none).
    pub headers: HashMap<String, String>,
}

/// A message envelope: identity, metadata, and a JSON or text payload.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Message metadata.
    pub metadata: MessageMetadata,
    /// Message payload.
    pub payload: MessagePayload,
}

/// Payload carried by a [`Message`].
#[derive(Debug, Clone)]
pub enum MessagePayload {
    /// Raw JSON bytes, not yet parsed.
    Json(Bytes),
    /// Plain text payload (used for line-delimited stdio framing).
    Text(String),
    /// No payload (heartbeats, empty acks).
    Empty,
}

impl Message {
    /// Create a message carrying a JSON-serialized value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized to JSON.
    pub fn json(id: MessageId, value: impl Serialize) -> Result<Self> {
        let bytes = serde_json::to_vec(&value).map_err(CoreError::from)?;
        let payload = MessagePayload::Json(Bytes::from(bytes));
        Ok(Self {
            id,
            metadata: MessageMetadata::new(ContentType::Json, payload.size()),
            payload,
        })
    }

    /// Create a message carrying raw text.
    #[must_use]
    pub fn text(id: MessageId, text: String) -> Self {
        let size = text.len();
        Self {
            id,
            metadata: MessageMetadata::new(ContentType::Text, size),
            payload: MessagePayload::Text(text),
        }
    }

    /// Create an empty message.
    #[must_use]
    pub fn empty(id: MessageId) -> Self {
        Self {
            id,
            metadata: MessageMetadata::new(ContentType::Json, 0),
            payload: MessagePayload::Empty,
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.metadata.size
    }

    /// Whether the payload is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.payload, MessagePayload::Empty)
    }

    /// Parse the JSON payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON or fails to deserialize.
    pub fn parse_json<T>(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match &self.payload {
            MessagePayload::Json(raw) => serde_json::from_slice(raw).map_err(CoreError::from),
            _ => Err(CoreError::validation("message payload is not JSON")),
        }
    }
}

impl MessagePayload {
    /// Size of the payload in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Json(bytes) => bytes.len(),
            Self::Text(text) => text.len(),
            Self::Empty => 0,
        }
    }
}

impl MessageMetadata {
    /// Create metadata stamped with the current time and default protocol version.
    #[must_use]
    pub fn new(content_type: ContentType, size: usize) -> Self {
        Self {
            created_at: Timestamp::now(),
            protocol_version: ProtocolVersion::default(),
            content_type,
            size,
            correlation_id: None,
            headers: HashMap::new(),
        }
    }

    /// Attach a custom header.
    #[must_use]
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<Uuid> for MessageId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_message_roundtrips() {
        let message = Message::json(MessageId::from("test"), json!({"key": "value"})).unwrap();
        assert_eq!(message.id.to_string(), "test");
        assert!(!message.is_empty());

        #[derive(Deserialize, PartialEq, Debug)]
        struct Payload {
            key: String,
        }
        let parsed: Payload = message.parse_json().unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn empty_message_has_zero_size() {
        let message = Message::empty(MessageId::from(1));
        assert!(message.is_empty());
        assert_eq!(message.size(), 0);
    }

    #[test]
    fn metadata_builders_set_fields() {
        let metadata = MessageMetadata::new(ContentType::Json, 100)
            .with_header("x-agent".to_string(), "CoderBlueKoala".to_string())
            .with_correlation_id("corr-123".to_string());

        assert_eq!(metadata.size, 100);
        assert_eq!(
            metadata.headers.get("x-agent"),
            Some(&"CoderBlueKoala".to_string())
        );
        assert_eq!(metadata.correlation_id, Some("corr-123".to_string()));
    }
}
