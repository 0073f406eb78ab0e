//! OpenAI chat-completions implementation of [`ToolAwareLlmProvider`].
//!
//! Works against any endpoint speaking the OpenAI wire format with streamed
//! `tool_calls`, including DashScope's compatible mode.
//!
//! [`ToolAwareLlmProvider`]: showroom_tool_runtime::ToolAwareLlmProvider

mod sse;
mod streaming;
mod translate;

pub use self::streaming::OpenAiCompatProvider;

#[cfg(test)]
mod tests;
