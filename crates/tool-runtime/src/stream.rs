use serde::{Deserialize, Serialize};

use crate::conversation::AssistantContent;
use crate::tool::ToolCall;

/// Events emitted while a model response streams in.
/// Provider-agnostic: each provider translates its wire format into these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A chunk of text from the assistant
    TextDelta { text: String },
    /// Start of a tool call (model wants to execute a tool)
    ToolCallStart { id: String, name: String },
    /// Incremental JSON argument data for a tool call
    ToolCallDelta { id: String, arguments_delta: String },
    /// Tool call arguments are complete
    ToolCallEnd { id: String },
    /// The entire message is complete
    MessageEnd { stop_reason: StopReason },
    /// An error occurred during streaming
    Error { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Normal end of response
    EndTurn,
    /// Model wants to use tools
    ToolUse,
    /// Hit max tokens limit
    MaxTokens,
    /// Stopped by stop sequence
    StopSequence,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
    ended: bool,
}

/// Folds a stream of [`StreamEvent`]s into one assistant message.
///
/// Tool calls are keyed by id so interleaved argument deltas from parallel
/// calls land in the right buffer. Calls keep the order they were started in,
/// whatever order the provider ends them.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    calls: Vec<PartialCall>,
    stop_reason: Option<StopReason>,
    errors: Vec<String>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_call(&mut self, id: &str) -> Option<&mut PartialCall> {
        self.calls.iter_mut().find(|c| !c.ended && c.id == id)
    }

    pub fn push(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.text.push_str(text),
            StreamEvent::ToolCallStart { id, name } => self.calls.push(PartialCall {
                id: id.clone(),
                name: name.clone(),
                ..Default::default()
            }),
            StreamEvent::ToolCallDelta {
                id,
                arguments_delta,
            } => {
                if let Some(call) = self.open_call(id) {
                    call.arguments.push_str(arguments_delta);
                }
            }
            StreamEvent::ToolCallEnd { id } => {
                if let Some(call) = self.open_call(id) {
                    call.ended = true;
                }
            }
            StreamEvent::MessageEnd { stop_reason } => self.stop_reason = Some(*stop_reason),
            StreamEvent::Error { message } => self.errors.push(message.clone()),
        }
    }

    /// Error events reported in-band by the provider.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Build the message; calls the provider never ended are closed as-is.
    pub fn finish(self) -> AssistantContent {
        AssistantContent {
            text: (!self.text.is_empty()).then_some(self.text),
            tool_calls: self.calls.into_iter().map(finish).collect(),
        }
    }
}

fn finish(call: PartialCall) -> ToolCall {
    let input = if call.arguments.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        // Non-JSON arguments are kept verbatim as a string argument.
        serde_json::from_str(&call.arguments)
            .unwrap_or(serde_json::Value::String(call.arguments))
    };
    ToolCall {
        id: call.id,
        name: call.name,
        input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulates_text_and_calls() {
        let mut acc = ResponseAccumulator::new();
        for event in [
            StreamEvent::TextDelta { text: "好的，".into() },
            StreamEvent::TextDelta { text: "马上下单".into() },
            StreamEvent::ToolCallStart { id: "c1".into(), name: "placeOrderTool".into() },
            StreamEvent::ToolCallStart { id: "c2".into(), name: "carBrandTool".into() },
            StreamEvent::ToolCallDelta { id: "c1".into(), arguments_delta: "{\"input\":".into() },
            StreamEvent::ToolCallDelta { id: "c2".into(), arguments_delta: "{}".into() },
            StreamEvent::ToolCallDelta { id: "c1".into(), arguments_delta: "\"奥迪A4L\"}".into() },
            StreamEvent::ToolCallEnd { id: "c2".into() },
            StreamEvent::ToolCallEnd { id: "c1".into() },
            StreamEvent::MessageEnd { stop_reason: StopReason::ToolUse },
        ] {
            acc.push(&event);
        }
        assert_eq!(acc.stop_reason(), Some(StopReason::ToolUse));
        let content = acc.finish();
        assert_eq!(content.text.as_deref(), Some("好的，马上下单"));
        assert_eq!(content.tool_calls.len(), 2);
        // Start order, not end order: c1 started first but ended last.
        assert_eq!(content.tool_calls[0].name, "placeOrderTool");
        assert_eq!(content.tool_calls[0].input, json!({"input": "奥迪A4L"}));
        assert_eq!(content.tool_calls[1].name, "carBrandTool");
    }

    #[test]
    fn test_dangling_and_raw_arguments() {
        let mut acc = ResponseAccumulator::new();
        acc.push(&StreamEvent::ToolCallStart { id: "c1".into(), name: "saleCarsInfoTool".into() });
        acc.push(&StreamEvent::ToolCallDelta { id: "c1".into(), arguments_delta: "宝马".into() });
        acc.push(&StreamEvent::Error { message: "boom".into() });

        assert_eq!(acc.errors(), ["boom".to_string()]);
        let content = acc.finish();
        assert!(content.text.is_none());
        assert_eq!(content.tool_calls[0].input, json!("宝马"));
    }
}
