use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use showroom_core::RunMetadata;

/// Describes a tool's interface for LLM consumption.
/// Maps to the OpenAI function-calling format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "placeOrderTool")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Represents an LLM requesting execution of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this invocation (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// JSON input arguments
    pub input: Value,
}

/// Result of executing a tool, sent back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Must match the ToolCall id
    pub tool_call_id: String,
    /// Result content (text or structured)
    pub content: String,
    /// Whether this result represents an error
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Context passed to tool execution: which thread is running and the
/// caller-supplied run metadata (user scoping).
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub thread_id: String,
    pub metadata: RunMetadata,
}

impl ToolContext {
    pub fn new(thread_id: impl Into<String>, metadata: RunMetadata) -> Self {
        Self {
            thread_id: thread_id.into(),
            metadata,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.metadata.user_id()
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Tools in this workspace accept a single free-text argument. Models send it
/// either as a bare JSON string or wrapped in an object under `field`.
pub fn text_argument(input: &Value, field: &str) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(field).and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

/// JSON Schema for a tool taking one optional string field.
pub fn single_text_schema(field: &str, description: &str) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            field: {
                "type": "string",
                "description": description
            }
        }
    })
}

/// Simple echo tool for testing purposes.
#[cfg(any(test, feature = "test-utils"))]
pub struct EchoTool;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes back the input message. For testing.".to_string(),
            input_schema: single_text_schema("message", "The message to echo back"),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let message = text_argument(&input, "message")
            .ok_or_else(|| ToolError::InvalidInput("missing 'message' field".to_string()))?;

        Ok(ToolResult::text(String::new(), message))
    }
}
