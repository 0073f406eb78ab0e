//! [`ToolAwareLlmProvider`] implementation over streamed chat completions.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use showroom_tool_runtime::{EventStream, LlmError, ModelRequest, ToolAwareLlmProvider};

use super::sse::parse_event_stream;
use super::translate::{build_messages, tool_definition_to_openai};

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    name: String,
}

impl OpenAiCompatProvider {
    /// * `base_url` - API root including the version segment, e.g.
    ///   `https://dashscope.aliyuncs.com/compatible-mode/v1`
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
            name: "openai".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(super) fn request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": build_messages(request.system_prompt.as_deref(), &request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(tool_definition_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl ToolAwareLlmProvider for OpenAiCompatProvider {
    async fn stream_with_tools(&self, request: ModelRequest) -> Result<EventStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.request_body(&request);

        debug!(model = %self.model, url = %url, messages = request.messages.len(), "starting chat completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body_text = response.text().await.unwrap_or_default();
            return Err(match status {
                401 | 403 => LlmError::AuthError,
                429 => LlmError::RateLimited {
                    retry_after_secs: retry_after.unwrap_or(30),
                },
                _ => LlmError::ApiError {
                    status,
                    message: body_text,
                },
            });
        }

        Ok(parse_event_stream(response.bytes_stream()))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }
}
