//! Request context and client identity extraction.
//!
//! `RequestContext` threads a request id, optional session/client identity,
//! and a cancellation token through a single dispatch. `ClientIdExtractor`
//! derives a [`ClientId`] from whatever the active transport can offer
//! (HTTP headers, a query parameter, a WebSocket handshake, or nothing at
//! all for stdio), which the coordinator uses to decide whether an inbound
//! tool call is local (same-process agent) or remote.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a client's identity was established for a given connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientId {
    /// Identified via an explicit `x-client-id` header.
    Header(String),
    /// Identified via a bearer token mapped to a known client.
    Token(String),
    /// Identified via an existing session id (cookie or query param).
    Session(String),
    /// Identified via a `client_id` query parameter.
    QueryParam(String),
    /// No identity could be established; the connection is anonymous.
    Anonymous,
}

impl ClientId {
    /// The identity as a bare string, or `"anonymous"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Header(s) | Self::Token(s) | Self::Session(s) | Self::QueryParam(s) => s,
            Self::Anonymous => "anonymous",
        }
    }

    /// Whether this identity came from an authenticated source.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }
}

/// Extracts a [`ClientId`] from whatever a transport can supply.
///
/// Priority order: query parameter > `x-client-id` header > bearer token >
/// session cookie > anonymous. stdio transports have none of these and
/// always resolve to `Anonymous`; they are instead identified in-band by the
/// agent's own `register_agent` call.
#[derive(Debug, Default)]
pub struct ClientIdExtractor {
    /// Bearer tokens mapped to the client id they authenticate.
    auth_tokens: Arc<DashMap<String, String>>,
}

impl ClientIdExtractor {
    /// Create an extractor with no registered tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bearer token as authenticating the given client id.
    pub fn register_token(&self, token: String, client_id: String) {
        self.auth_tokens.insert(token, client_id);
    }

    /// Resolve a client id from HTTP-style headers plus an optional query param.
    #[must_use]
    pub fn extract_client_id(
        &self,
        headers: &HashMap<String, String>,
        query_client_id: Option<&str>,
    ) -> ClientId {
        if let Some(id) = query_client_id {
            return ClientId::QueryParam(id.to_string());
        }
        if let Some(id) = headers.get("x-client-id") {
            return ClientId::Header(id.clone());
        }
        if let Some(auth) = headers.get("authorization")
            && let Some(token) = auth.strip_prefix("Bearer ")
            && let Some(client_id) = self.auth_tokens.get(token)
        {
            return ClientId::Token(client_id.clone());
        }
        if let Some(session_id) = headers.get("cookie").and_then(|c| extract_session_cookie(c)) {
            return ClientId::Session(session_id);
        }
        ClientId::Anonymous
    }
}

fn extract_session_cookie(cookie_header: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == "session_id").then(|| value.to_string())
    })
}

/// Context threaded through a single request dispatch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id for this request, used in logs and the event log.
    pub request_id: String,
    /// Identity of the caller, if known.
    pub client_id: ClientId,
    /// Coordinator session token, once an agent has authenticated.
    pub session_id: Option<String>,
    /// Wall-clock time the request started.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata (e.g. transport type, negotiated protocol version).
    pub metadata: Arc<HashMap<String, serde_json::Value>>,
    /// Token observing client disconnect / shutdown, for cooperative cancellation.
    pub cancellation_token: CancellationToken,
}

impl RequestContext {
    /// Start a new top-level request context.
    #[must_use]
    pub fn new(client_id: ClientId) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            client_id,
            session_id: None,
            timestamp: Utc::now(),
            metadata: Arc::new(HashMap::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Attach a session id (set once an agent authenticates).
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    /// Derive a child context for a sub-operation (e.g. one leg of a
    /// cross-codebase task), sharing cancellation but with a fresh request id.
    #[must_use]
    pub fn derive(&self) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            client_id: self.client_id.clone(),
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            metadata: self.metadata.clone(),
            cancellation_token: self.cancellation_token.child_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_wins_over_header() {
        let extractor = ClientIdExtractor::new();
        let mut headers = HashMap::new();
        headers.insert("x-client-id".to_string(), "from-header".to_string());

        let id = extractor.extract_client_id(&headers, Some("from-query"));
        assert_eq!(id, ClientId::QueryParam("from-query".to_string()));
    }

    #[test]
    fn bearer_token_resolves_registered_client() {
        let extractor = ClientIdExtractor::new();
        extractor.register_token("tok-123".to_string(), "agent-7".to_string());

        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer tok-123".to_string());

        let id = extractor.extract_client_id(&headers, None);
        assert_eq!(id, ClientId::Token("agent-7".to_string()));
    }

    #[test]
    fn no_identity_sources_resolves_anonymous() {
        let extractor = ClientIdExtractor::new();
        let id = extractor.extract_client_id(&HashMap::new(), None);
        assert_eq!(id, ClientId::Anonymous);
        assert!(!id.is_authenticated());
    }

    #[test]
    fn derived_context_shares_cancellation_but_not_request_id() {
        let parent = RequestContext::new(ClientId::Anonymous);
        let child = parent.derive();
        assert_ne!(parent.request_id, child.request_id);
        parent.cancellation_token.cancel();
        assert!(child.cancellation_token.is_cancelled());
    }
}
