//! Units of progress emitted by a running turn.

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;

use showroom_tool_runtime::{ToolCall, ToolResult};

use crate::error::TurnError;
use crate::interruption::InterruptionMetadata;
use crate::thread::TurnOutput;

pub const START_NODE: &str = "__START__";
/// Terminal marker of an executor event sequence.
pub const END_NODE: &str = "__END__";
pub const MODEL_NODE: &str = "model";
pub const TOOL_NODE: &str = "tools";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeOutput {
    /// A chunk of assistant text.
    AssistantDelta { text: String },
    /// An assistant message requesting tool calls, not yet resolved.
    ToolCalls { calls: Vec<ToolCall> },
    /// A tool call resolved to a result (executed, failed or denied).
    ToolResult { tool: String, result: ToolResult },
    /// The turn suspended awaiting approval.
    Interruption(InterruptionMetadata),
    /// Terminal marker. Sources that cannot report the final output send `None`.
    End { output: Option<TurnOutput> },
}

impl NodeOutput {
    pub fn node(&self) -> &str {
        match self {
            NodeOutput::AssistantDelta { .. } | NodeOutput::ToolCalls { .. } => MODEL_NODE,
            NodeOutput::ToolResult { .. } => TOOL_NODE,
            NodeOutput::Interruption(meta) => &meta.node,
            NodeOutput::End { .. } => END_NODE,
        }
    }
}

pub type NodeStream = Pin<Box<dyn Stream<Item = Result<NodeOutput, TurnError>> + Send>>;
