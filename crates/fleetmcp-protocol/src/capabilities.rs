//! Capability negotiation.
//!
//! The coordinator only ever advertises the `tools` capability, so
//! negotiation is simpler than full MCP: a client's capabilities are
//! accepted as-is, and the resulting set always contains `tools`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{ClientCapabilities, ServerCapabilities, ToolsCapabilities};

/// Capability matcher for negotiating features between client and server.
#[derive(Debug, Clone)]
pub struct CapabilityMatcher {
    /// Default feature states.
    defaults: HashMap<String, bool>,
}

impl Default for CapabilityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityMatcher {
    /// Create a matcher with the coordinator's default rule: `tools` is
    /// always server-provided and always enabled.
    #[must_use]
    pub fn new() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("tools".to_string(), true);
        Self { defaults }
    }

    /// Whether a feature is enabled between the given client and server.
    #[must_use]
    pub fn is_compatible(
        &self,
        feature: &str,
        client: &ClientCapabilities,
        server: &ServerCapabilities,
    ) -> bool {
        match feature {
            "tools" => server.tools.is_some(),
            _ => client
                .experimental
                .as_ref()
                .is_some_and(|experimental| experimental.contains_key(feature)),
        }
    }

    fn all_features(&self, client: &ClientCapabilities, server: &ServerCapabilities) -> HashSet<String> {
        let mut features: HashSet<String> = self.defaults.keys().cloned().collect();
        if server.tools.is_some() {
            features.insert("tools".to_string());
        }
        if let Some(experimental) = &client.experimental {
            features.extend(experimental.keys().cloned());
        }
        if let Some(experimental) = &server.experimental {
            features.extend(experimental.keys().cloned());
        }
        features
    }

    /// Negotiate capabilities, producing the enabled feature set.
    ///
    /// # Errors
    ///
    /// Never fails in practice: the coordinator's capability surface has no
    /// feature that requires mutual support, so this only returns
    /// `Err` for symmetry with richer MCP implementations.
    pub fn negotiate(
        &self,
        client: &ClientCapabilities,
        server: &ServerCapabilities,
    ) -> Result<CapabilitySet, CapabilityError> {
        let all_features = self.all_features(client, server);
        let enabled_features = all_features
            .into_iter()
            .filter(|feature| self.is_compatible(feature, client, server))
            .collect();

        Ok(CapabilitySet {
            enabled_features,
            client_capabilities: client.clone(),
            server_capabilities: server.clone(),
            metadata: HashMap::new(),
        })
    }
}

/// Negotiated capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Enabled features.
    pub enabled_features: HashSet<String>,
    /// Negotiated client capabilities.
    pub client_capabilities: ClientCapabilities,
    /// Negotiated server capabilities.
    pub server_capabilities: ServerCapabilities,
    /// Additional metadata from negotiation.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CapabilitySet {
    /// An empty capability set with default (minimal) client/server capabilities.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            enabled_features: HashSet::new(),
            client_capabilities: ClientCapabilities::default(),
            server_capabilities: ServerCapabilities::default(),
            metadata: HashMap::new(),
        }
    }

    /// Whether a feature is enabled.
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.enabled_features.contains(feature)
    }
}

/// Negotiator wrapping a [`CapabilityMatcher`] with server-side defaults.
#[derive(Debug, Clone, Default)]
pub struct CapabilityNegotiator {
    matcher: CapabilityMatcher,
}

impl CapabilityNegotiator {
    /// Build the coordinator's server-side capability advertisement.
    #[must_use]
    pub fn server_capabilities() -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            tools: Some(ToolsCapabilities {
                list_changed: Some(true),
            }),
        }
    }

    /// Negotiate capabilities for an incoming client.
    ///
    /// # Errors
    ///
    /// See [`CapabilityMatcher::negotiate`].
    pub fn negotiate(&self, client: &ClientCapabilities) -> Result<CapabilitySet, CapabilityError> {
        self.matcher.negotiate(client, &Self::server_capabilities())
    }
}

/// Capability negotiation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    /// Protocol version mismatch.
    #[error("protocol version mismatch: client={client}, server={server}")]
    VersionMismatch {
        /// Client version string.
        client: String,
        /// Server version string.
        server: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_feature_is_always_enabled() {
        let negotiator = CapabilityNegotiator::default();
        let client = ClientCapabilities::default();

        let set = negotiator.negotiate(&client).unwrap();
        assert!(set.has_feature("tools"));
    }

    #[test]
    fn unknown_experimental_feature_requires_client_advertisement() {
        let matcher = CapabilityMatcher::new();
        let mut experimental = HashMap::new();
        experimental.insert("batch_tools".to_string(), serde_json::json!(true));
        let client = ClientCapabilities {
            experimental: Some(experimental),
        };
        let server = CapabilityNegotiator::server_capabilities();

        assert!(matcher.is_compatible("batch_tools", &client, &server));
        assert!(!matcher.is_compatible("unregistered_feature", &client, &server));
    }
}
