//! Tool Filter (C10): pure, stateless local/remote catalog policy.

use fleetmcp_protocol::types::Tool;

/// Request security context, set by the Transport Adapter that received the
/// request (`local` for stdio, `remote` for HTTP/WS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityContext {
    /// Trusted, same-host caller (stdio).
    Local,
    /// Untrusted network caller (HTTP/WS).
    Remote,
}

/// A tool descriptor as seen by the filter: the wire `Tool` plus the two
/// policy-relevant facts the Tool Registry attaches (source and
/// `remote_safe`).
#[derive(Debug, Clone)]
pub struct FilterableTool {
    /// The wire tool descriptor.
    pub tool: Tool,
    /// `native` or the backend name that discovered it.
    pub source: String,
    /// Whether this tool is safe to expose to a remote, untrusted caller.
    pub remote_safe: bool,
}

/// Filter policy: deny patterns/tags applied on top of the `remote_safe`
/// flag for remote contexts. Local contexts always see the full catalog.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    /// Name substrings that are never exposed remotely (e.g. `"terminal"`,
    /// `"filesystem_write"`).
    pub deny_patterns: Vec<String>,
}

impl FilterPolicy {
    /// Default policy: deny nothing beyond `remote_safe=false`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply this policy to `catalog` under `context`.
    #[must_use]
    pub fn apply<'a>(&self, catalog: &'a [FilterableTool], context: SecurityContext) -> Vec<&'a FilterableTool> {
        match context {
            SecurityContext::Local => catalog.iter().collect(),
            SecurityContext::Remote => catalog
                .iter()
                .filter(|entry| entry.remote_safe)
                .filter(|entry| {
                    !self
                        .deny_patterns
                        .iter()
                        .any(|pattern| entry.tool.name.contains(pattern.as_str()))
                })
                .collect(),
        }
    }
}

/// Default heuristic for `remote_safe`, used by the Tool Registry when a
/// backend-discovered tool carries no explicit annotation: tools whose name
/// suggests filesystem mutation, terminal access, or editor control are
/// denied by default.
#[must_use]
pub fn default_remote_safe(tool_name: &str) -> bool {
    const UNSAFE_SUBSTRINGS: &[&str] = &["write_file", "delete", "terminal", "execute", "editor_control", "shell"];
    !UNSAFE_SUBSTRINGS.iter().any(|pattern| tool_name.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmcp_protocol::types::ToolInputSchema;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            title: None,
            description: None,
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: None,
                required: None,
            },
            annotations: None,
        }
    }

    #[test]
    fn local_context_returns_full_catalog() {
        let catalog = vec![FilterableTool {
            tool: tool("mcp_fs_write_file"),
            source: "fs".to_string(),
            remote_safe: false,
        }];
        let policy = FilterPolicy::new();
        assert_eq!(policy.apply(&catalog, SecurityContext::Local).len(), 1);
    }

    #[test]
    fn remote_context_strips_unsafe_tools() {
        let catalog = vec![
            FilterableTool {
                tool: tool("mcp_fs_write_file"),
                source: "fs".to_string(),
                remote_safe: false,
            },
            FilterableTool {
                tool: tool("mcp_fs_read_file"),
                source: "fs".to_string(),
                remote_safe: true,
            },
        ];
        let policy = FilterPolicy::new();
        let filtered = policy.apply(&catalog, SecurityContext::Remote);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].tool.name, "mcp_fs_read_file");
    }

    #[test]
    fn default_remote_safe_flags_mutating_tools() {
        assert!(!default_remote_safe("mcp_fs_write_file"));
        assert!(!default_remote_safe("terminal_execute"));
        assert!(default_remote_safe("mcp_fs_read_file"));
    }
}
