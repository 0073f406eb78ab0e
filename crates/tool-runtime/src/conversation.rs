use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum ConversationMessage {
    /// User's text input
    User(String),
    /// Assistant's response (may contain text and/or tool calls)
    Assistant(AssistantContent),
    /// Result of a tool execution
    ToolResult(ToolResult),
}

/// Content from the assistant that can contain mixed text and tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantContent {
    /// Text blocks in the response
    pub text: Option<String>,
    /// Tool calls requested by the assistant
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Append-only message history of one thread.
///
/// The full history is persisted; [`Conversation::window`] selects the suffix
/// that fits the model's context budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ConversationMessage>) -> Self {
        Self { messages }
    }

    pub fn add_user_message(&mut self, text: String) {
        self.messages.push(ConversationMessage::User(text));
    }

    pub fn add_assistant_response(&mut self, content: AssistantContent) {
        self.messages.push(ConversationMessage::Assistant(content));
    }

    pub fn add_tool_result(&mut self, result: ToolResult) {
        self.messages.push(ConversationMessage::ToolResult(result));
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            ConversationMessage::User(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Tool calls of the most recent assistant message that have no result yet.
    pub fn unresolved_tool_calls(&self) -> Vec<ToolCall> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, ConversationMessage::Assistant(_)))
        else {
            return Vec::new();
        };
        let ConversationMessage::Assistant(content) = &self.messages[pos] else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                ConversationMessage::ToolResult(r) => Some(r.tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        content
            .tool_calls
            .iter()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .cloned()
            .collect()
    }

    /// Approximate token count using character count / 4 heuristic.
    pub fn approximate_tokens(messages: &[ConversationMessage]) -> usize {
        let char_count: usize = messages
            .iter()
            .map(|m| match m {
                ConversationMessage::User(text) => text.len(),
                ConversationMessage::Assistant(content) => {
                    content.text.as_ref().map_or(0, |t| t.len())
                        + content
                            .tool_calls
                            .iter()
                            .map(|tc| tc.input.to_string().len())
                            .sum::<usize>()
                }
                ConversationMessage::ToolResult(result) => result.content.len(),
            })
            .sum();
        char_count / 4
    }

    /// The longest suffix of the history within `max_tokens`, always keeping
    /// at least the last 2 messages.
    ///
    /// A window never starts on a tool result: it is widened back to the
    /// assistant message that issued the call, even past the budget. Only a
    /// result with no preceding message at all is dropped.
    pub fn window(&self, max_tokens: usize) -> &[ConversationMessage] {
        let is_result = |i: usize| matches!(self.messages[i], ConversationMessage::ToolResult(_));

        let mut start = 0;
        while start + 2 < self.messages.len()
            && Self::approximate_tokens(&self.messages[start..]) > max_tokens
        {
            start += 1;
        }
        if start < self.messages.len() && is_result(start) {
            let mut owner = start;
            while owner > 0 && is_result(owner) {
                owner -= 1;
            }
            if is_result(owner) {
                while start < self.messages.len() && is_result(start) {
                    start += 1;
                }
            } else {
                start = owner;
            }
        }
        &self.messages[start..]
    }
}
