//! HTTP + Server-Sent-Events transport for remote agents.
//!
//! A remote agent talks to the coordinator over three HTTP surfaces: a
//! request/response endpoint (`POST /mcp/request`), a push channel
//! (`GET /mcp/stream`, `text/event-stream`), and a couple of read-only
//! convenience routes. This module provides the pieces shared by all of
//! them — session header extraction, the SSE event framing, and a
//! [`Transport`] implementation that pairs an inbound and an outbound
//! channel for one session so the rest of the coordinator can treat an
//! HTTP session exactly like a stdio or WebSocket connection.
//!
//! Route handlers that wire these into an `axum::Router` live with the
//! rest of the coordinator's HTTP surface, since they need access to the
//! session table and router dispatch.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::sse::Event;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, interval};
use fleetmcp_core::MessageId;

use crate::core::{
    Transport, TransportCapabilities, TransportError, TransportMessage, TransportMetrics,
    TransportResult, TransportState, TransportType,
};

/// Primary session header, per the protocol's authentication scheme.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Legacy alias accepted alongside [`SESSION_HEADER`].
pub const SESSION_HEADER_LEGACY: &str = "X-Session-Id";

/// Response header carrying the negotiated protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "Mcp-Protocol-Version";

/// Extract the session token from either the primary or legacy header.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .or_else(|| headers.get(SESSION_HEADER_LEGACY))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Build the `Server` response header value for this build.
#[must_use]
pub fn server_header_value() -> String {
    format!("AgentCoordinator/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Interval between SSE `heartbeat` events.
    pub heartbeat_interval: Duration,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

/// Events pushed over the `GET /mcp/stream` SSE channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SseSessionEvent {
    /// Sent once, immediately after the stream opens.
    Connected {
        /// The session this stream belongs to.
        session_id: String,
        /// Negotiated protocol version string.
        protocol_version: String,
        /// Unix timestamp in seconds.
        timestamp: i64,
    },
    /// Sent periodically to keep the connection alive and signal liveness.
    Heartbeat {
        /// Unix timestamp in seconds.
        timestamp: i64,
        /// The session this stream belongs to.
        session_id: String,
    },
}

impl SseSessionEvent {
    /// Convert to an `axum` SSE [`Event`], tagging it with the matching event name.
    #[must_use]
    pub fn into_axum_event(self) -> Event {
        let name = match &self {
            Self::Connected { .. } => "connected",
            Self::Heartbeat { .. } => "heartbeat",
        };
        let data = match &self {
            Self::Connected {
                session_id,
                protocol_version,
                timestamp,
            } => serde_json::json!({
                "session_id": session_id,
                "protocol_version": protocol_version,
                "timestamp": timestamp,
            }),
            Self::Heartbeat {
                timestamp,
                session_id,
            } => serde_json::json!({
                "timestamp": timestamp,
                "session_id": session_id,
            }),
        };
        Event::default().event(name).json_data(data).unwrap_or_else(|_| Event::default())
    }
}

/// A [`Stream`] of SSE events for one session: forwards pushes from the
/// router and injects its own heartbeat on a fixed interval.
pub struct SseStream {
    session_id: String,
    protocol_version: String,
    pushes: mpsc::Receiver<SseSessionEvent>,
    heartbeat: Interval,
    sent_connected: bool,
}

impl SseStream {
    /// Create a new SSE stream for `session_id`, fed by `pushes`.
    pub fn new(
        session_id: impl Into<String>,
        protocol_version: impl Into<String>,
        config: &HttpTransportConfig,
        pushes: mpsc::Receiver<SseSessionEvent>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            protocol_version: protocol_version.into(),
            pushes,
            heartbeat: interval(config.heartbeat_interval),
            sent_connected: false,
        }
    }

    fn now_secs() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl Stream for SseStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.sent_connected {
            self.sent_connected = true;
            let event = SseSessionEvent::Connected {
                session_id: self.session_id.clone(),
                protocol_version: self.protocol_version.clone(),
                timestamp: Self::now_secs(),
            };
            return Poll::Ready(Some(event.into_axum_event()));
        }

        if let Poll::Ready(Some(event)) = self.pushes.poll_recv(cx) {
            return Poll::Ready(Some(event.into_axum_event()));
        }

        if self.heartbeat.poll_tick(cx) != Poll::Pending {
            let event = SseSessionEvent::Heartbeat {
                timestamp: Self::now_secs(),
                session_id: self.session_id.clone(),
            };
            return Poll::Ready(Some(event.into_axum_event()));
        }

        Poll::Pending
    }
}

impl std::fmt::Debug for SseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// `Transport` over a paired set of channels for one HTTP session:
/// requests arrive via `POST /mcp/request` and are pushed into `inbound`,
/// responses are sent back out through `outbound` for the route handler
/// to write back as the HTTP response body (or fan out over SSE).
#[derive(Debug)]
pub struct HttpTransport {
    session_id: String,
    config: HttpTransportConfig,
    state: TransportState,
    capabilities: TransportCapabilities,
    metrics: TransportMetrics,
    inbound: mpsc::Receiver<TransportMessage>,
    outbound: mpsc::Sender<TransportMessage>,
}

impl HttpTransport {
    /// Create a transport for a session, returning it alongside the sender
    /// half the HTTP route handler uses to hand requests in.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        config: HttpTransportConfig,
    ) -> (Self, mpsc::Sender<TransportMessage>, mpsc::Receiver<TransportMessage>) {
        let (in_tx, in_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::channel(256);

        let capabilities = TransportCapabilities {
            max_message_size: Some(config.max_message_size),
            supports_streaming: true,
            supports_compression: false,
            supports_bidirectional: true,
            supports_multiplexing: true,
            compression_algorithms: Vec::new(),
            custom: HashMap::new(),
        };

        let transport = Self {
            session_id: session_id.into(),
            config,
            state: TransportState::Connected,
            capabilities,
            metrics: TransportMetrics::default(),
            inbound: in_rx,
            outbound: out_tx,
        };

        (transport, in_tx, out_rx)
    }

    /// The session this transport is bound to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.state = TransportState::Disconnected;
        Ok(())
    }

    async fn send(&mut self, message: TransportMessage) -> TransportResult<()> {
        if message.payload.len() > self.config.max_message_size {
            return Err(TransportError::SendFailed(format!(
                "message too large: {} bytes",
                message.payload.len()
            )));
        }
        self.outbound
            .send(message.clone())
            .await
            .map_err(|_| TransportError::ConnectionLost("session closed".to_string()))?;
        self.metrics.messages_sent += 1;
        self.metrics.bytes_sent += message.payload.len() as u64;
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Option<TransportMessage>> {
        match self.inbound.recv().await {
            Some(message) => {
                self.metrics.messages_received += 1;
                self.metrics.bytes_received += message.payload.len() as u64;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn state(&self) -> TransportState {
        self.state.clone()
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn metrics(&self) -> TransportMetrics {
        self.metrics.clone()
    }
}

/// Build a single [`TransportMessage`] from a raw request body.
#[must_use]
pub fn message_from_body(id: MessageId, body: Bytes) -> TransportMessage {
    TransportMessage::new(id, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn primary_session_header_wins_over_legacy() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("primary-token"));
        headers.insert(SESSION_HEADER_LEGACY, HeaderValue::from_static("legacy-token"));
        assert_eq!(
            extract_session_token(&headers),
            Some("primary-token".to_string())
        );
    }

    #[test]
    fn legacy_session_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER_LEGACY, HeaderValue::from_static("legacy-token"));
        assert_eq!(
            extract_session_token(&headers),
            Some("legacy-token".to_string())
        );
    }

    #[test]
    fn missing_session_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_session_token(&headers), None);
    }

    #[tokio::test]
    async fn http_transport_round_trips_a_message() {
        let (mut transport, in_tx, mut out_rx) =
            HttpTransport::new("sess-1", HttpTransportConfig::default());

        let request = TransportMessage::new(MessageId::Number(1), Bytes::from_static(b"{}"));
        in_tx.send(request.clone()).await.unwrap();

        let received = transport.receive().await.unwrap().unwrap();
        assert_eq!(received.id, request.id);

        let response = TransportMessage::new(MessageId::Number(1), Bytes::from_static(b"{}"));
        transport.send(response.clone()).await.unwrap();
        let forwarded = out_rx.recv().await.unwrap();
        assert_eq!(forwarded.id, response.id);
    }
}
