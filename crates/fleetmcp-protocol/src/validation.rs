//! Protocol message validation.
//!
//! Covers the JSON-RPC envelope (method name, id, result-xor-error) and
//! `tools/call` argument validation against a tool's declared JSON Schema.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::types::{InitializeRequest, Tool};

/// Protocol message validator.
#[derive(Debug, Clone, Default)]
pub struct ProtocolValidator {
    rules: ValidationRules,
}

/// Validation rules configuration.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    /// Maximum string length accepted anywhere in a message.
    pub max_string_length: usize,
    /// Maximum array length accepted anywhere in a message.
    pub max_array_length: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_string_length: 1024 * 1024,
            max_array_length: 10_000,
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation passed.
    Valid,
    /// Validation passed with warnings.
    ValidWithWarnings(Vec<ValidationWarning>),
    /// Validation failed.
    Invalid(Vec<ValidationError>),
}

/// A non-fatal validation concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Warning code.
    pub code: String,
    /// Warning message.
    pub message: String,
    /// Field path, if applicable.
    pub field_path: Option<String>,
}

/// A fatal validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Field path, if applicable.
    pub field_path: Option<String>,
}

#[derive(Debug, Default)]
struct ValidationContext {
    warnings: Vec<ValidationWarning>,
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    fn add_error(&mut self, code: &str, message: String, field_path: Option<&str>) {
        self.errors.push(ValidationError {
            code: code.to_string(),
            message,
            field_path: field_path.map(str::to_string),
        });
    }

    fn add_warning(&mut self, code: &str, message: String, field_path: Option<&str>) {
        self.warnings.push(ValidationWarning {
            code: code.to_string(),
            message,
            field_path: field_path.map(str::to_string),
        });
    }

    fn into_result(self) -> ValidationResult {
        if !self.errors.is_empty() {
            ValidationResult::Invalid(self.errors)
        } else if !self.warnings.is_empty() {
            ValidationResult::ValidWithWarnings(self.warnings)
        } else {
            ValidationResult::Valid
        }
    }
}

impl ProtocolValidator {
    /// Create a validator with the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a JSON-RPC request envelope.
    #[must_use]
    pub fn validate_request(&self, request: &JsonRpcRequest) -> ValidationResult {
        let mut ctx = ValidationContext::default();
        self.validate_method_name(&request.method, &mut ctx);
        ctx.into_result()
    }

    /// Validate a JSON-RPC response envelope: exactly one of `result`/`error`.
    #[must_use]
    pub fn validate_response(&self, response: &JsonRpcResponse) -> ValidationResult {
        let mut ctx = ValidationContext::default();
        match (response.result.is_some(), response.error.is_some()) {
            (true, true) => ctx.add_error(
                "RESPONSE_BOTH_RESULT_AND_ERROR",
                "response cannot have both result and error".to_string(),
                None,
            ),
            (false, false) => ctx.add_error(
                "RESPONSE_MISSING_RESULT_OR_ERROR",
                "response must have either result or error".to_string(),
                None,
            ),
            _ => {}
        }
        ctx.into_result()
    }

    /// Validate a JSON-RPC notification envelope.
    #[must_use]
    pub fn validate_notification(&self, notification: &JsonRpcNotification) -> ValidationResult {
        let mut ctx = ValidationContext::default();
        self.validate_method_name(&notification.method, &mut ctx);
        ctx.into_result()
    }

    /// Validate a tool descriptor returned from `tools/list`.
    #[must_use]
    pub fn validate_tool(&self, tool: &Tool) -> ValidationResult {
        let mut ctx = ValidationContext::default();

        if tool.name.is_empty() {
            ctx.add_error(
                "TOOL_EMPTY_NAME",
                "tool name cannot be empty".to_string(),
                Some("name"),
            );
        }
        if tool.name.len() > self.rules.max_string_length {
            ctx.add_error(
                "TOOL_NAME_TOO_LONG",
                format!(
                    "tool name exceeds maximum length of {}",
                    self.rules.max_string_length
                ),
                Some("name"),
            );
        }
        if tool.input_schema.schema_type != "object" {
            ctx.add_warning(
                "NON_OBJECT_SCHEMA",
                "tool input schema should typically be 'object'".to_string(),
                Some("inputSchema.type"),
            );
        }

        ctx.into_result()
    }

    /// Validate `tools/call` arguments against a tool's declared input schema.
    #[must_use]
    pub fn validate_tool_arguments(&self, tool: &Tool, arguments: &Value) -> ValidationResult {
        let mut ctx = ValidationContext::default();

        let schema = match serde_json::to_value(&tool.input_schema) {
            Ok(schema) => schema,
            Err(err) => {
                ctx.add_error(
                    "SCHEMA_SERIALIZATION_FAILED",
                    format!("failed to serialize tool schema: {err}"),
                    None,
                );
                return ctx.into_result();
            }
        };

        let compiled = JSONSchema::options().with_draft(Draft::Draft7).compile(&schema);

        match compiled {
            Ok(compiled) => {
                if let Err(errors) = compiled.validate(arguments) {
                    for error in errors {
                        ctx.add_error(
                            "SCHEMA_VALIDATION_FAILED",
                            error.to_string(),
                            Some(&error.instance_path.to_string()),
                        );
                    }
                }
            }
            Err(err) => {
                ctx.add_error(
                    "SCHEMA_COMPILE_FAILED",
                    format!("tool input schema does not compile: {err}"),
                    None,
                );
            }
        }

        ctx.into_result()
    }

    /// Validate an `initialize` request.
    #[must_use]
    pub fn validate_initialize_request(&self, request: &InitializeRequest) -> ValidationResult {
        let mut ctx = ValidationContext::default();

        if !crate::SUPPORTED_VERSIONS.contains(&request.protocol_version.as_str()) {
            ctx.add_warning(
                "UNSUPPORTED_PROTOCOL_VERSION",
                format!(
                    "protocol version {} is not officially supported",
                    request.protocol_version
                ),
                Some("protocolVersion"),
            );
        }
        if request.client_info.name.is_empty() {
            ctx.add_error(
                "EMPTY_CLIENT_NAME",
                "client name cannot be empty".to_string(),
                Some("clientInfo.name"),
            );
        }
        if request.client_info.version.is_empty() {
            ctx.add_error(
                "EMPTY_CLIENT_VERSION",
                "client version cannot be empty".to_string(),
                Some("clientInfo.version"),
            );
        }

        ctx.into_result()
    }

    fn validate_method_name(&self, method: &str, ctx: &mut ValidationContext) {
        if method.is_empty() {
            ctx.add_error(
                "EMPTY_METHOD_NAME",
                "method name cannot be empty".to_string(),
                Some("method"),
            );
            return;
        }
        let valid = method
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && method
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/');
        if !valid {
            ctx.add_error(
                "INVALID_METHOD_NAME",
                format!("invalid method name format: {method}"),
                Some("method"),
            );
        }
    }
}

impl ValidationResult {
    /// Whether validation passed, with or without warnings.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }

    /// Whether validation failed outright.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Whether validation produced warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        matches!(self, Self::ValidWithWarnings(_))
    }

    /// Warnings produced, if any.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        match self {
            Self::ValidWithWarnings(warnings) => warnings,
            _ => &[],
        }
    }

    /// Errors produced, if any.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        match self {
            Self::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcVersion;
    use crate::types::{ClientCapabilities, Implementation, RequestId, ToolInputSchema};

    fn sample_tool() -> Tool {
        Tool {
            name: "create_task".to_string(),
            title: None,
            description: Some("Create a task".to_string()),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: None,
                required: Some(vec!["title".to_string()]),
            },
            annotations: None,
        }
    }

    #[test]
    fn empty_tool_name_is_invalid() {
        let validator = ProtocolValidator::new();
        let mut tool = sample_tool();
        tool.name = String::new();
        assert!(validator.validate_tool(&tool).is_invalid());
    }

    #[test]
    fn request_with_empty_method_is_invalid() {
        let validator = ProtocolValidator::new();
        let request = JsonRpcRequest {
            jsonrpc: JsonRpcVersion,
            method: String::new(),
            params: None,
            id: RequestId::String("test-id".to_string()),
        };
        assert!(validator.validate_request(&request).is_invalid());
    }

    #[test]
    fn missing_required_argument_fails_schema_validation() {
        let validator = ProtocolValidator::new();
        let tool = sample_tool();
        let arguments = serde_json::json!({});
        let result = validator.validate_tool_arguments(&tool, &arguments);
        assert!(result.is_invalid());
    }

    #[test]
    fn satisfying_required_argument_passes_schema_validation() {
        let validator = ProtocolValidator::new();
        let tool = sample_tool();
        let arguments = serde_json::json!({"title": "Fix login bug"});
        let result = validator.validate_tool_arguments(&tool, &arguments);
        assert!(result.is_valid());
    }

    #[test]
    fn initialize_with_old_version_warns_but_is_valid() {
        let validator = ProtocolValidator::new();
        let request = InitializeRequest {
            protocol_version: "2023-01-01".to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "agent-client".to_string(),
                title: None,
                version: "1.0.0".to_string(),
            },
        };
        let result = validator.validate_initialize_request(&request);
        assert!(result.is_valid());
        assert!(result.has_warnings());
    }
}
