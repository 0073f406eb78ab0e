//! Hooks around each reasoning call.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use showroom_tool_runtime::{AssistantContent, ConversationMessage};

pub const BLOCKED_CONTENT_REPLY: &str = "检测到不适当的内容，请修改您的输入";

#[async_trait]
pub trait ModelInterceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Return a reply to skip the model call entirely.
    async fn before_model(&self, _messages: &[ConversationMessage]) -> Option<AssistantContent> {
        None
    }

    async fn after_model(
        &self,
        _messages: &[ConversationMessage],
        _content: &AssistantContent,
        _elapsed: Duration,
    ) {
    }
}

/// Refuses to forward a user message that contains a blocked word.
pub struct ContentFilter {
    blocked_words: Vec<String>,
    reply: String,
}

impl ContentFilter {
    pub fn new(blocked_words: Vec<String>) -> Self {
        Self {
            blocked_words: blocked_words
                .into_iter()
                .filter(|w| !w.trim().is_empty())
                .collect(),
            reply: BLOCKED_CONTENT_REPLY.to_string(),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    fn blocked_word<'a>(&'a self, text: &str) -> Option<&'a str> {
        self.blocked_words
            .iter()
            .find(|w| text.contains(w.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl ModelInterceptor for ContentFilter {
    fn name(&self) -> &str {
        "content_filter"
    }

    async fn before_model(&self, messages: &[ConversationMessage]) -> Option<AssistantContent> {
        let latest = messages.iter().rev().find_map(|m| match m {
            ConversationMessage::User(text) => Some(text.as_str()),
            _ => None,
        })?;
        let word = self.blocked_word(latest)?;
        warn!(word, "blocked user input");
        Some(AssistantContent::text(self.reply.clone()))
    }
}

/// Logs message count and latency of every reasoning call.
pub struct ModelTimingLogger;

#[async_trait]
impl ModelInterceptor for ModelTimingLogger {
    fn name(&self) -> &str {
        "model_timing"
    }

    async fn after_model(
        &self,
        messages: &[ConversationMessage],
        content: &AssistantContent,
        elapsed: Duration,
    ) {
        info!(
            message_count = messages.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            tool_calls = content.tool_calls.len(),
            "model call complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showroom_tool_runtime::ToolResult;

    fn filter() -> ContentFilter {
        ContentFilter::new(vec!["敏感词2".into(), "".into()])
    }

    #[tokio::test]
    async fn test_blocks_latest_user_message() {
        let messages = vec![
            ConversationMessage::User("这里有敏感词2".into()),
            ConversationMessage::ToolResult(ToolResult::text("c1", "ok")),
        ];
        let reply = filter().before_model(&messages).await.unwrap();
        assert_eq!(reply.text.as_deref(), Some(BLOCKED_CONTENT_REPLY));
    }

    #[tokio::test]
    async fn test_only_latest_user_message_counts() {
        let messages = vec![
            ConversationMessage::User("敏感词2".into()),
            ConversationMessage::Assistant(AssistantContent::text("...")),
            ConversationMessage::User("你们有哪些车？".into()),
        ];
        assert!(filter().before_model(&messages).await.is_none());
        // Empty entries never match everything.
        assert!(filter().before_model(&[ConversationMessage::User("hi".into())]).await.is_none());
    }
}
