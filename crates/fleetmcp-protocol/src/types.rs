//! MCP protocol value types.
//!
//! The coordinator implements the `initialize` / `tools/list` / `tools/call`
//! surface only; this module carries the wire types for exactly that
//! surface plus the capability negotiation envelope around it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use fleetmcp_core::MessageId;

/// Protocol version string, e.g. `"2025-06-18"`.
pub type ProtocolVersion = String;

/// JSON-RPC request identifier.
pub type RequestId = MessageId;

/// Base metadata shared by `Tool` and similar descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseMetadata {
    /// Programmatic identifier.
    pub name: String,
    /// Human-readable display name; falls back to `name` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Implementation identity exchanged during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version.
    pub version: String,
}

/// The `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Protocol version the client wants to use.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,
    /// Client capability advertisement.
    pub capabilities: ClientCapabilities,
    /// Client implementation identity.
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// The `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the coordinator will use for this session.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,
    /// Coordinator capability advertisement.
    pub capabilities: ServerCapabilities,
    /// Coordinator implementation identity.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Free-form instructions shown to the client, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `notifications/initialized`, sent by the client after `initialize` completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializedNotification;

/// Capabilities a client advertises.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Capabilities the coordinator advertises. Only `tools` is ever populated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
    /// Present; the coordinator always offers tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapabilities>,
}

/// Tool-related capability flags.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsCapabilities {
    /// Whether the coordinator emits `notifications/tools/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// JSON Schema for a tool's input, as advertised in `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property schemas, keyed by parameter name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
    /// Names of required properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// Behavioral hints about a tool, surfaced to clients for UI purposes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolAnnotations {
    /// Human-readable title, preferred over `name` for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether the tool only reads state.
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
}

/// A tool descriptor, as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, used as the `tools/call` identifier.
    pub name: String,
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing accepted arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
    /// Behavioral hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

/// `tools/list` request. Empty; the coordinator does not paginate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListToolsRequest {
    /// Opaque pagination cursor (accepted for protocol compliance, unused).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// The aggregated tool catalog.
    pub tools: Vec<Tool>,
    /// Always `None`; the coordinator returns the full catalog in one page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Name of the tool to invoke.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A single piece of content in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        /// The text itself.
        text: String,
    },
}

/// `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Result content blocks.
    pub content: Vec<ContentBlock>,
    /// Structured output, when the tool declares an output schema.
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
    /// Whether the tool call failed. Absent/`false` means success.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Build a successful result from structured JSON, rendering a text block too.
    #[must_use]
    pub fn success(value: serde_json::Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self {
            content: vec![ContentBlock::Text { text }],
            structured_content: Some(value),
            is_error: None,
        }
    }

    /// Build an error result carrying a human-readable message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_result_carries_both_text_and_structured_content() {
        let result = CallToolResult::success(serde_json::json!({"ok": true}));
        assert!(result.is_error.is_none());
        assert!(result.structured_content.is_some());
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn failure_result_sets_is_error() {
        let result = CallToolResult::failure("unknown tool");
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn tool_serializes_input_schema_as_camel_case() {
        let tool = Tool {
            name: "heartbeat".to_string(),
            title: None,
            description: Some("Keep an agent's session alive".to_string()),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: None,
                required: Some(vec!["agent_id".to_string()]),
            },
            annotations: None,
        };
        let json = serde_json::to_value(&tool).unwrap();
        assert!(json.get("inputSchema").is_some());
        assert!(json.get("input_schema").is_none());
    }
}
