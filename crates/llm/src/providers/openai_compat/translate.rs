//! Translation between provider-agnostic conversation types and the
//! chat-completions format.

use serde_json::{json, Value};

use showroom_tool_runtime::{ConversationMessage, ToolDefinition};

pub(super) fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Arguments travel as a JSON-encoded string. Raw string inputs (arguments
/// that never parsed as JSON) are sent back verbatim.
fn encode_arguments(input: &Value) -> String {
    match input {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

pub(super) fn message_to_openai(msg: &ConversationMessage) -> Value {
    match msg {
        ConversationMessage::User(text) => json!({
            "role": "user",
            "content": text,
        }),
        ConversationMessage::Assistant(content) => {
            let mut message = json!({
                "role": "assistant",
                "content": content.text,
            });
            if !content.tool_calls.is_empty() {
                let calls: Vec<Value> = content
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": encode_arguments(&tc.input),
                            }
                        })
                    })
                    .collect();
                message["tool_calls"] = Value::Array(calls);
            }
            message
        }
        ConversationMessage::ToolResult(result) => json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        }),
    }
}

/// Full message list with the system prompt first.
pub(super) fn build_messages(system_prompt: Option<&str>, messages: &[ConversationMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        out.push(json!({"role": "system", "content": system}));
    }
    out.extend(messages.iter().map(message_to_openai));
    out
}
