//! Tool descriptors and invocation results.
//!
//! These are opaque to the supervisor: the protocol collaborator produces
//! them and the connection manager only stores and forwards them.

use serde::{Deserialize, Serialize};

/// A callable operation exposed by a connected server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl Tool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Result of a tool call.
///
/// A tool that ran and reported failure is a successful *call* with
/// `success == false`; transport failures are errors instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool reported success.
    pub success: bool,

    /// Result payload (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message reported by the tool (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_skips_empty_optionals() {
        let json = serde_json::to_string(&Tool::new("read_file")).unwrap();
        assert_eq!(json, r#"{"name":"read_file"}"#);
    }

    #[test]
    fn tool_result_constructors() {
        let ok = ToolResult::success(serde_json::json!({"lines": 3}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ToolResult::error("permission denied");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("permission denied"));
    }
}
