use crate::conversation::ConversationMessage;
use crate::stream::StreamEvent;
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// One model call: the windowed history, system prompt and tool schemas.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<ConversationMessage>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for chat-model backends that support tool calling.
///
/// Defined here, next to its consumer (the turn executor); implementations
/// live in the llm crate.
#[async_trait]
pub trait ToolAwareLlmProvider: Send + Sync {
    /// Stream a response with tool definitions available.
    async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError>;

    /// Non-streaming convenience: collects the full response.
    async fn complete_with_tools(&self, request: ModelRequest) -> Result<Vec<StreamEvent>, LlmError> {
        use futures::StreamExt;
        let stream = self.stream_with_tools(request).await?;
        stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
    }

    /// Provider name for logging (e.g. "dashscope", "openai")
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Scripted provider for exercising the executor without a real model.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::stream::StopReason;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Scripted {
        Events(Vec<StreamEvent>),
        Fail(String),
    }

    /// Returns queued responses in FIFO order and records every request.
    /// When the queue is empty it answers with an empty end-of-turn message.
    #[derive(Default)]
    pub struct MockLlmProvider {
        responses: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl MockLlmProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_response(&self, events: Vec<StreamEvent>) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Scripted::Events(events));
        }

        pub fn queue_text(&self, text: &str) {
            self.queue_response(vec![
                StreamEvent::TextDelta {
                    text: text.to_string(),
                },
                StreamEvent::MessageEnd {
                    stop_reason: StopReason::EndTurn,
                },
            ]);
        }

        /// Queue a response asking for a single tool call.
        pub fn queue_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) {
            self.queue_response(vec![
                StreamEvent::ToolCallStart {
                    id: id.to_string(),
                    name: name.to_string(),
                },
                StreamEvent::ToolCallDelta {
                    id: id.to_string(),
                    arguments_delta: arguments.to_string(),
                },
                StreamEvent::ToolCallEnd { id: id.to_string() },
                StreamEvent::MessageEnd {
                    stop_reason: StopReason::ToolUse,
                },
            ]);
        }

        /// Make the next call fail before any event is produced.
        pub fn queue_failure(&self, message: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Scripted::Fail(message.to_string()));
        }

        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ToolAwareLlmProvider for MockLlmProvider {
        async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError> {
            self.requests.lock().unwrap().push(request);
            let next = self.responses.lock().unwrap().pop_front();
            let events = match next {
                Some(Scripted::Events(events)) => events,
                Some(Scripted::Fail(message)) => {
                    return Err(LlmError::ApiError {
                        status: 500,
                        message,
                    })
                }
                None => vec![StreamEvent::MessageEnd {
                    stop_reason: StopReason::EndTurn,
                }],
            };
            Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn request() -> ModelRequest {
            ModelRequest {
                messages: Vec::new(),
                system_prompt: None,
                tools: Vec::new(),
                temperature: 0.0,
                max_tokens: 16,
            }
        }

        #[tokio::test]
        async fn test_mock_is_fifo_and_records() {
            let mock = MockLlmProvider::new();
            mock.queue_text("first");
            mock.queue_failure("down");

            let events = mock.complete_with_tools(request()).await.unwrap();
            assert_eq!(events[0], StreamEvent::TextDelta { text: "first".into() });
            assert!(matches!(
                mock.complete_with_tools(request()).await,
                Err(LlmError::ApiError { status: 500, .. })
            ));
            assert_eq!(mock.call_count(), 2);
        }
    }
}
